use crate::error::ProtocolError;
use crate::parse::BinaryCursor;

/// Which Valve engine generation a server runs.
///
/// The two share the logical protocol but differ in split-packet framing,
/// info layout and RCON transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineType {
    GoldSource,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    Single,
    Split,
}

impl PacketHeader {
    pub const SINGLE: i32 = -1;
    pub const SPLIT: i32 = -2;

    /// Classify the leading 4 bytes of a datagram.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let header = BinaryCursor::new(raw)
            .read_i32_le()
            .map_err(|e| ProtocolError::malformed(e, raw))?;
        match header {
            Self::SINGLE => Ok(PacketHeader::Single),
            Self::SPLIT => Ok(PacketHeader::Split),
            header => Err(ProtocolError::InvalidHeader {
                header,
                raw: raw.to_vec(),
            }),
        }
    }

    /// For packing a [PacketHeader] into a request.
    pub fn to_le_bytes(self) -> [u8; 4] {
        match self {
            PacketHeader::Single => Self::SINGLE.to_le_bytes(),
            PacketHeader::Split => Self::SPLIT.to_le_bytes(),
        }
    }
}

/// Leading byte of a reassembled query payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// A2S_INFO response
    Info,
    /// Pre-Source A2S_INFO response
    ObsoleteInfo,
    /// A2S_PLAYER response
    Player,
    /// A2S_RULES response
    Rules,
    /// S2C_CHALLENGE
    ///
    /// The client should repeat the request with the challenge number attached.
    Challenge,
}

impl ResponseType {
    pub const fn to_byte(self) -> u8 {
        match self {
            ResponseType::Info => 0x49,
            ResponseType::ObsoleteInfo => 0x6D,
            ResponseType::Player => 0x44,
            ResponseType::Rules => 0x45,
            ResponseType::Challenge => 0x41,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x49 => Some(ResponseType::Info),
            0x6D => Some(ResponseType::ObsoleteInfo),
            0x44 => Some(ResponseType::Player),
            0x45 => Some(ResponseType::Rules),
            0x41 => Some(ResponseType::Challenge),
            _ => None,
        }
    }

    /// Check that `payload` starts with this type byte.
    pub fn expect(self, payload: &[u8]) -> Result<(), ProtocolError> {
        match payload.first() {
            Some(b) if *b == self.to_byte() => Ok(()),
            found => Err(ProtocolError::UnexpectedType {
                expected: self.to_byte(),
                found: found.copied().unwrap_or(0),
                raw: payload.to_vec(),
            }),
        }
    }
}

/// Opaque 4-byte token a server hands out before answering player/rule queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Challenge([u8; 4]);

impl Challenge {
    /// The placeholder sent while asking for a challenge.
    pub const REQUEST: Challenge = Challenge([0xFF; 4]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let token: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Challenge(token))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

/// Query requests understood by game servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPacket {
    /// A2S_INFO, optionally carrying an anti-spoofing challenge.
    Info { challenge: Option<Vec<u8>> },
    /// The pre-Source `details` query.
    ObsoleteInfo { challenge: Option<Vec<u8>> },
    /// A2S_PLAYER
    Player(Challenge),
    /// A2S_RULES
    Rules(Challenge),
    /// A2S_SERVERQUERY_GETCHALLENGE, used by obsolete servers.
    GetChallenge,
}

impl RequestPacket {
    const INFO_BODY: &'static [u8] = b"TSource Engine Query\0";
    const OBSOLETE_INFO_BODY: &'static [u8] = b"details\0";
    const PLAYER: u8 = 0x55;
    const RULES: u8 = 0x56;
    const GET_CHALLENGE: u8 = 0x57;

    pub fn info() -> Self {
        RequestPacket::Info { challenge: None }
    }

    pub fn obsolete_info() -> Self {
        RequestPacket::ObsoleteInfo { challenge: None }
    }

    /// The same info request with a challenge token appended.
    ///
    /// Player and rule requests carry their challenge in place and are
    /// returned unchanged.
    pub fn with_challenge(&self, token: &[u8]) -> Self {
        match self {
            RequestPacket::Info { .. } => RequestPacket::Info {
                challenge: Some(token.to_vec()),
            },
            RequestPacket::ObsoleteInfo { .. } => RequestPacket::ObsoleteInfo {
                challenge: Some(token.to_vec()),
            },
            other => other.clone(),
        }
    }

    /// Serializes a request packet into an array of bytes.
    pub fn pack(&self) -> Vec<u8> {
        let mut payload: Vec<u8> = Vec::with_capacity(32);
        payload.extend_from_slice(&PacketHeader::Single.to_le_bytes());
        match self {
            RequestPacket::Info { challenge } => {
                payload.extend_from_slice(Self::INFO_BODY);
                if let Some(c) = challenge {
                    payload.extend_from_slice(c);
                }
            }
            RequestPacket::ObsoleteInfo { challenge } => {
                payload.extend_from_slice(Self::OBSOLETE_INFO_BODY);
                if let Some(c) = challenge {
                    payload.extend_from_slice(c);
                }
            }
            RequestPacket::Player(challenge) => {
                payload.push(Self::PLAYER);
                payload.extend_from_slice(challenge.as_bytes());
            }
            RequestPacket::Rules(challenge) => {
                payload.push(Self::RULES);
                payload.extend_from_slice(challenge.as_bytes());
            }
            RequestPacket::GetChallenge => payload.push(Self::GET_CHALLENGE),
        }
        payload
    }
}
