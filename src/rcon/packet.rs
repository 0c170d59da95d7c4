use log::trace;

use crate::error::{ProtocolError, Result};
use crate::parse::BinaryCursor;
use crate::transport::TcpTransport;

/// Id of the sentinel packet sent after each command; echoes are framing only.
pub const EMPTY_ID: i32 = 10;
/// Correlation id of every command and its responses.
pub const EXEC_ID: i32 = 11;
/// Id the server puts in an auth response when the password was wrong.
pub const AUTH_FAILED_ID: i32 = -1;

pub const AUTH: i32 = 3;
pub const AUTH_RESPONSE: i32 = 2;
pub const EXEC: i32 = 2;
pub const EXEC_RESPONSE: i32 = 0;

/// id + type + two terminators
const MIN_SIZE: i32 = 10;
/// Longest body a server puts in one packet.
const MAX_BODY: i32 = 4096;
const MAX_SIZE: i32 = MIN_SIZE + MAX_BODY;

/// A Source RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        RconPacket {
            id,
            kind,
            body: body.into(),
        }
    }

    /// `[size][id][type][body]\0\0`, with `size` computed from the body.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = MIN_SIZE + body.len() as i32;
        let mut out = Vec::with_capacity(size as usize + 4);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.kind.to_le_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(&[0, 0]);
        out
    }

    /// Decode one packet from the front of `buf`.
    ///
    /// Returns the packet and the number of bytes it occupied, or `None`
    /// while `buf` does not yet hold a whole packet. The size field is
    /// checked against protocol limits rather than trusted.
    pub fn decode(buf: &[u8]) -> std::result::Result<Option<(RconPacket, usize)>, ProtocolError> {
        let mut cursor = BinaryCursor::new(buf);
        let size = match cursor.read_i32_le() {
            Ok(size) => size,
            Err(_) => return Ok(None),
        };
        if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
            return Err(ProtocolError::InvalidRconPacket {
                size,
                raw: buf.to_vec(),
            });
        }
        let frame = match cursor.take(size as usize) {
            Ok(frame) => frame,
            Err(_) => return Ok(None),
        };

        let mut frame_cursor = BinaryCursor::new(frame);
        let malformed = |e| ProtocolError::malformed(e, &buf[..4 + size as usize]);
        let id = frame_cursor.read_i32_le().map_err(malformed)?;
        let kind = frame_cursor.read_i32_le().map_err(malformed)?;
        let body = frame_cursor.read_cstring().map_err(malformed)?;
        if frame_cursor.remaining() != [0] {
            return Err(ProtocolError::InvalidRconPacket {
                size,
                raw: buf[..4 + size as usize].to_vec(),
            });
        }

        Ok(Some((RconPacket { id, kind, body }, 4 + size as usize)))
    }
}

/// Packet-level framing on top of a [TcpTransport].
///
/// TCP may split or merge packets across reads, so received bytes are
/// buffered until a whole packet is available.
#[derive(Debug)]
pub struct ControlChannel {
    transport: TcpTransport,
    pending: Vec<u8>,
}

impl ControlChannel {
    pub fn new(transport: TcpTransport) -> Self {
        ControlChannel {
            transport,
            pending: Vec::new(),
        }
    }

    pub async fn send(&mut self, packet: &RconPacket) -> Result<()> {
        trace!("rcon send id={} type={}", packet.id, packet.kind);
        self.transport.send(&packet.encode()).await?;
        Ok(())
    }

    pub async fn receive(&mut self) -> Result<RconPacket> {
        loop {
            if let Some((packet, used)) = RconPacket::decode(&self.pending)? {
                self.pending.drain(..used);
                trace!(
                    "rcon receive id={} type={} ({} byte body)",
                    packet.id,
                    packet.kind,
                    packet.body.len()
                );
                return Ok(packet);
            }
            let chunk = self.transport.receive().await?;
            self.pending.extend_from_slice(&chunk);
        }
    }

    pub fn close(&mut self) {
        self.pending.clear();
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }
}
