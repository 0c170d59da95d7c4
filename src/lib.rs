//! Pure Rust async client for the Valve game server protocols:
//! [server queries](https://developer.valvesoftware.com/wiki/Server_queries),
//! [Source RCON](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol),
//! GoldSource RCON and the
//! [master server query protocol](https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol).
pub mod config;
pub mod error;
pub mod info;
pub mod master;
pub mod packet;
pub mod parse;
pub mod player;
pub mod query;
pub mod rcon;
pub mod rule;
pub mod server;
pub mod transport;

pub use config::{FormatHint, SessionConfig, Timeouts};
pub use error::{Error, Result};
pub use info::ServerInfo;
pub use master::{Filter, MasterDirectory, Region};
pub use packet::EngineType;
pub use player::Player;
pub use rcon::RconSession;
pub use rule::Rule;
pub use server::{query, ServerSession};
