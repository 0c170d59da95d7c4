//! Remote console sessions for both engine generations.
mod goldsource;
pub mod packet;
mod source;

pub use goldsource::GoldSourceRcon;
pub use source::SourceRcon;

use std::net::{IpAddr, SocketAddr};

use crate::config::Timeouts;
use crate::error::Result;
use crate::packet::EngineType;

/// An authorized RCON session.
#[derive(Debug)]
pub enum RconSession {
    GoldSource(GoldSourceRcon),
    Source(SourceRcon),
}

impl RconSession {
    /// Connect to `endpoint` and authorize with `password` using the engine's transport.
    pub async fn authorize(
        endpoint: SocketAddr,
        engine: EngineType,
        password: &str,
        timeouts: Timeouts,
    ) -> Result<Self> {
        match engine {
            EngineType::GoldSource => GoldSourceRcon::authorize(endpoint, password, timeouts)
                .await
                .map(RconSession::GoldSource),
            EngineType::Source => SourceRcon::authorize(endpoint, password, timeouts)
                .await
                .map(RconSession::Source),
        }
    }

    pub fn engine(&self) -> EngineType {
        match self {
            RconSession::GoldSource(_) => EngineType::GoldSource,
            RconSession::Source(_) => EngineType::Source,
        }
    }

    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        match self {
            RconSession::GoldSource(rcon) => rcon.send_command(command).await,
            RconSession::Source(rcon) => rcon.send_command(command).await,
        }
    }

    /// Ask the server to stream its log to `ip:port`.
    pub async fn add_log_address(&mut self, ip: IpAddr, port: u16) -> Result<String> {
        match self {
            RconSession::GoldSource(rcon) => rcon.add_log_address(ip, port).await,
            RconSession::Source(rcon) => rcon.add_log_address(ip, port).await,
        }
    }

    pub async fn remove_log_address(&mut self, ip: IpAddr, port: u16) -> Result<String> {
        match self {
            RconSession::GoldSource(rcon) => rcon.remove_log_address(ip, port).await,
            RconSession::Source(rcon) => rcon.remove_log_address(ip, port).await,
        }
    }

    pub fn close(&mut self) {
        match self {
            RconSession::GoldSource(rcon) => rcon.close(),
            RconSession::Source(rcon) => rcon.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            RconSession::GoldSource(rcon) => rcon.is_closed(),
            RconSession::Source(rcon) => rcon.is_closed(),
        }
    }
}
