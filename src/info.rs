use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::{ParseError, ProtocolError};
use crate::packet::ResponseType;
use crate::parse::BinaryCursor;

/// Server type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// `d`: Dedicated
    Dedicated,
    /// `l`: Listen (non-dedicated)
    Listen,
    /// `p`: SourceTV relay (proxy)
    Proxy,
    Unknown(u8),
}

impl From<u8> for ServerType {
    fn from(byte: u8) -> Self {
        match byte.to_ascii_lowercase() {
            b'd' => ServerType::Dedicated,
            b'l' => ServerType::Listen,
            b'p' => ServerType::Proxy,
            _ => ServerType::Unknown(byte),
        }
    }
}

/// Server environment byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// `l`: Linux
    Linux,
    /// `w`: Windows
    Windows,
    /// `m` or `o`: Mac
    Mac,
    Unknown(u8),
}

impl From<u8> for Environment {
    fn from(byte: u8) -> Self {
        match byte.to_ascii_lowercase() {
            b'l' => Environment::Linux,
            b'w' => Environment::Windows,
            b'm' | b'o' => Environment::Mac,
            _ => Environment::Unknown(byte),
        }
    }
}

/// Extra fields sent by The Ship servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TheShip {
    /// 0 Hunt, 1 Elimination, 2 Duel, 3 Deathmatch, 4 VIP Team, 5 Team Elimination
    pub mode: u8,
    pub witnesses: u8,
    /// Seconds before a player is arrested while being witnessed.
    pub duration: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTv {
    pub port: u16,
    pub name: String,
}

/// Optional trailer selected by the Extra Data Flag byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraInfo {
    pub port: Option<u16>,
    pub steam_id: Option<u64>,
    pub source_tv: Option<SourceTv>,
    pub keywords: Option<String>,
    /// 64-bit game id; the low 24 bits are the app id.
    pub game_id: Option<u64>,
}

impl ExtraInfo {
    const PORT: u8 = 0x80;
    const STEAM_ID: u8 = 0x10;
    const SOURCE_TV: u8 = 0x40;
    const KEYWORDS: u8 = 0x20;
    const GAME_ID: u8 = 0x01;

    fn read(edf: u8, cursor: &mut BinaryCursor) -> Result<Self, ParseError> {
        let mut extra = ExtraInfo::default();
        if edf & Self::PORT != 0 {
            extra.port = Some(cursor.read_u16_le()?);
        }
        if edf & Self::STEAM_ID != 0 {
            extra.steam_id = Some(cursor.read_u64_le()?);
        }
        if edf & Self::SOURCE_TV != 0 {
            extra.source_tv = Some(SourceTv {
                port: cursor.read_u16_le()?,
                name: cursor.read_cstring()?,
            });
        }
        if edf & Self::KEYWORDS != 0 {
            extra.keywords = Some(cursor.read_cstring()?);
        }
        if edf & Self::GAME_ID != 0 {
            extra.game_id = Some(cursor.read_u64_le()?);
        }
        Ok(extra)
    }

    /// Keywords split on commas, empty entries dropped.
    pub fn tags(&self) -> Vec<&str> {
        self.keywords
            .as_deref()
            .map(|k| k.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// A2S_INFO reply in the current format.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentInfo {
    /// A2S_INFO protocol version
    pub protocol: u8,
    /// Server hostname
    pub hostname: String,
    /// Current map
    pub map: String,
    /// Location of server files
    pub folder: String,
    /// Name of game
    pub game: String,
    /// Steam ID of game
    pub game_id: u16,
    /// Current players
    pub players: u8,
    /// Max players
    pub maxplayers: u8,
    /// Current bots
    pub bots: u8,
    pub server_type: ServerType,
    pub server_env: Environment,
    /// Is the server password protected?
    pub password_protected: bool,
    /// Is the server VAC enabled?
    pub vac_enabled: bool,
    /// Only present for The Ship.
    pub the_ship: Option<TheShip>,
    /// Game version
    pub version: String,
    pub extra: Option<ExtraInfo>,
    pub latency: Duration,
}

impl CurrentInfo {
    const THE_SHIP_IDS: RangeInclusive<u16> = 2400..=2412;

    fn read(cursor: &mut BinaryCursor, latency: Duration) -> Result<Self, ParseError> {
        let protocol = cursor.read_u8()?;
        let hostname = cursor.read_cstring()?;
        let map = cursor.read_cstring()?;
        let folder = cursor.read_cstring()?;
        let game = cursor.read_cstring()?;
        let game_id = cursor.read_u16_le()?;
        let players = cursor.read_u8()?;
        let maxplayers = cursor.read_u8()?;
        let bots = cursor.read_u8()?;
        let server_type = ServerType::from(cursor.read_u8()?);
        let server_env = Environment::from(cursor.read_u8()?);
        let password_protected = cursor.read_u8()? == 1;
        let vac_enabled = cursor.read_u8()? == 1;

        let the_ship = if Self::THE_SHIP_IDS.contains(&game_id) {
            Some(TheShip {
                mode: cursor.read_u8()?,
                witnesses: cursor.read_u8()?,
                duration: cursor.read_u8()?,
            })
        } else {
            None
        };

        let version = cursor.read_cstring()?;

        // the EDF byte is optional on older servers
        let extra = if cursor.is_empty() {
            None
        } else {
            let edf = cursor.read_u8()?;
            Some(ExtraInfo::read(edf, cursor)?)
        };

        Ok(CurrentInfo {
            protocol,
            hostname,
            map,
            folder,
            game,
            game_id,
            players,
            maxplayers,
            bots,
            server_type,
            server_env,
            password_protected,
            vac_enabled,
            the_ship,
            version,
            extra,
            latency,
        })
    }
}

/// Details of a Half-Life mod, present when the obsolete reply flags one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    pub link: String,
    pub download_link: String,
    pub version: i32,
    /// Space used by the mod, in bytes.
    pub size: i32,
    pub multiplayer_only: bool,
    /// Whether the mod ships its own DLL instead of the Half-Life one.
    pub own_dll: bool,
}

impl ModInfo {
    fn read(cursor: &mut BinaryCursor) -> Result<Self, ParseError> {
        let link = cursor.read_cstring()?;
        let download_link = cursor.read_cstring()?;
        cursor.skip(1)?;
        Ok(ModInfo {
            link,
            download_link,
            version: cursor.read_i32_le()?,
            size: cursor.read_i32_le()?,
            multiplayer_only: cursor.read_u8()? == 1,
            own_dll: cursor.read_u8()? == 1,
        })
    }
}

/// Info reply in the pre-Source (`m`) format.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsoleteInfo {
    /// `ip:port` as the server sees itself
    pub address: String,
    pub hostname: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub players: u8,
    pub maxplayers: u8,
    pub protocol: u8,
    pub server_type: ServerType,
    pub server_env: Environment,
    pub password_protected: bool,
    pub is_modded: bool,
    pub mod_info: Option<ModInfo>,
    pub vac_enabled: bool,
    pub bots: u8,
    pub latency: Duration,
}

impl ObsoleteInfo {
    fn read(cursor: &mut BinaryCursor, latency: Duration) -> Result<Self, ParseError> {
        let address = cursor.read_cstring()?;
        let hostname = cursor.read_cstring()?;
        let map = cursor.read_cstring()?;
        let folder = cursor.read_cstring()?;
        let game = cursor.read_cstring()?;
        let players = cursor.read_u8()?;
        let maxplayers = cursor.read_u8()?;
        let protocol = cursor.read_u8()?;
        let server_type = ServerType::from(cursor.read_u8()?);
        let server_env = Environment::from(cursor.read_u8()?);
        let password_protected = cursor.read_u8()? == 1;
        let is_modded = cursor.read_u8()? == 1;
        let mod_info = if is_modded {
            Some(ModInfo::read(cursor)?)
        } else {
            None
        };
        let vac_enabled = cursor.read_u8()? == 1;
        let bots = cursor.read_u8()?;

        Ok(ObsoleteInfo {
            address,
            hostname,
            map,
            folder,
            game,
            players,
            maxplayers,
            protocol,
            server_type,
            server_env,
            password_protected,
            is_modded,
            mod_info,
            vac_enabled,
            bots,
            latency,
        })
    }
}

/// Server information as obtained by [ServerSession::get_info](crate::server::ServerSession::get_info).
///
/// The leading type byte of the reply decides which shape was sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerInfo {
    Current(CurrentInfo),
    Obsolete(ObsoleteInfo),
}

impl ServerInfo {
    /// Parse a reassembled info payload (starting at its type byte).
    pub fn parse(payload: &[u8], latency: Duration) -> Result<ServerInfo, ProtocolError> {
        let mut cursor = BinaryCursor::new(payload);
        let kind = cursor
            .read_u8()
            .map_err(|e| ProtocolError::malformed(e, payload))?;
        let info = match ResponseType::from_byte(kind) {
            Some(ResponseType::Info) => {
                CurrentInfo::read(&mut cursor, latency).map(ServerInfo::Current)
            }
            Some(ResponseType::ObsoleteInfo) => {
                ObsoleteInfo::read(&mut cursor, latency).map(ServerInfo::Obsolete)
            }
            _ => {
                return Err(ProtocolError::UnexpectedType {
                    expected: ResponseType::Info.to_byte(),
                    found: kind,
                    raw: payload.to_vec(),
                })
            }
        };
        info.map_err(|e| ProtocolError::malformed(e, payload))
    }

    pub fn is_obsolete(&self) -> bool {
        matches!(self, ServerInfo::Obsolete(_))
    }

    pub fn hostname(&self) -> &str {
        match self {
            ServerInfo::Current(i) => &i.hostname,
            ServerInfo::Obsolete(i) => &i.hostname,
        }
    }

    pub fn map(&self) -> &str {
        match self {
            ServerInfo::Current(i) => &i.map,
            ServerInfo::Obsolete(i) => &i.map,
        }
    }

    pub fn folder(&self) -> &str {
        match self {
            ServerInfo::Current(i) => &i.folder,
            ServerInfo::Obsolete(i) => &i.folder,
        }
    }

    pub fn game(&self) -> &str {
        match self {
            ServerInfo::Current(i) => &i.game,
            ServerInfo::Obsolete(i) => &i.game,
        }
    }

    pub fn players(&self) -> u8 {
        match self {
            ServerInfo::Current(i) => i.players,
            ServerInfo::Obsolete(i) => i.players,
        }
    }

    pub fn maxplayers(&self) -> u8 {
        match self {
            ServerInfo::Current(i) => i.maxplayers,
            ServerInfo::Obsolete(i) => i.maxplayers,
        }
    }

    pub fn bots(&self) -> u8 {
        match self {
            ServerInfo::Current(i) => i.bots,
            ServerInfo::Obsolete(i) => i.bots,
        }
    }

    pub fn password_protected(&self) -> bool {
        match self {
            ServerInfo::Current(i) => i.password_protected,
            ServerInfo::Obsolete(i) => i.password_protected,
        }
    }

    pub fn latency(&self) -> Duration {
        match self {
            ServerInfo::Current(i) => i.latency,
            ServerInfo::Obsolete(i) => i.latency,
        }
    }
}
