use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::time::error::Elapsed;

/// Failures of [BinaryCursor](crate::parse::BinaryCursor) reads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("read of {wanted} byte(s) at offset {offset} runs past the end of a {len} byte buffer")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },
    #[error("string starting at offset {offset} is not null-terminated")]
    UnterminatedString { offset: usize },
}

/// Socket-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind a local port: {0}")]
    FailedPortBind(#[source] io::Error),
    #[error("host is unreachable: {0}")]
    UnreachableHost(#[source] io::Error),
    #[error("failed to send packet: {0}")]
    SendError(#[source] io::Error),
    #[error("failed to receive packet: {0}")]
    ReceiveError(#[source] io::Error),
    #[error("timed out waiting on socket")]
    Timeout(#[from] Elapsed),
    #[error("socket is closed")]
    Closed,
}

/// The peer sent something this crate cannot make sense of.
///
/// Variants raised from received data carry the offending bytes in `raw`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown packet header {header} ({} byte(s) received)", .raw.len())]
    InvalidHeader { header: i32, raw: Vec<u8> },
    #[error("unexpected response type {found:#04x}, expected {expected:#04x}")]
    UnexpectedType { expected: u8, found: u8, raw: Vec<u8> },
    #[error("invalid multi-packet response: {reason}")]
    InvalidSplit { reason: &'static str, raw: Vec<u8> },
    #[error("checksum mismatch: packet says {expected:#010x}, payload hashes to {computed:#010x}")]
    ChecksumMismatch {
        expected: u32,
        computed: u32,
        raw: Vec<u8>,
    },
    #[error("failed to decompress payload: {source}")]
    Decompress {
        #[source]
        source: io::Error,
        raw: Vec<u8>,
    },
    #[error("malformed packet: {source}")]
    Malformed {
        #[source]
        source: ParseError,
        raw: Vec<u8>,
    },
    #[error("server kept re-issuing challenges")]
    ChallengeLoop { raw: Vec<u8> },
    #[error("could not read rcon challenge from reply")]
    InvalidChallenge { raw: Vec<u8> },
    #[error("invalid rcon packet size {size}")]
    InvalidRconPacket { size: i32, raw: Vec<u8> },
    #[error("master server repeated seed {seed}")]
    StalledEnumeration { seed: SocketAddr, raw: Vec<u8> },
}

impl ProtocolError {
    /// Wrap a cursor failure together with the buffer it was reading.
    pub fn malformed(source: ParseError, raw: &[u8]) -> Self {
        ProtocolError::Malformed {
            source,
            raw: raw.to_vec(),
        }
    }

    /// The received bytes that triggered this error, if any.
    pub fn raw(&self) -> &[u8] {
        match self {
            ProtocolError::InvalidHeader { raw, .. }
            | ProtocolError::UnexpectedType { raw, .. }
            | ProtocolError::InvalidSplit { raw, .. }
            | ProtocolError::ChecksumMismatch { raw, .. }
            | ProtocolError::Decompress { raw, .. }
            | ProtocolError::Malformed { raw, .. }
            | ProtocolError::ChallengeLoop { raw }
            | ProtocolError::InvalidChallenge { raw }
            | ProtocolError::InvalidRconPacket { raw, .. }
            | ProtocolError::StalledEnumeration { raw, .. } => raw,
        }
    }
}

/// RCON credential failures, kept apart from wire corruption.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("bad rcon password")]
    BadPassword,
    #[error("rcon session is not authorized")]
    NotAuthorized,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("master server enumeration already in progress")]
    Busy,
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Timeout(_)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
