use std::net::{IpAddr, SocketAddr};

use log::debug;

use crate::config::Timeouts;
use crate::error::{AuthError, ProtocolError, Result};
use crate::packet::{EngineType, PacketHeader};
use crate::query::QueryChannel;
use crate::transport::UdpTransport;

const CHALLENGE_REQUEST: &[u8] = b"challenge rcon\n\0";
const CHALLENGE_PREFIX: &str = "challenge rcon ";
const BAD_PASSWORD: &str = "Bad rcon_password";

/// GoldSource RCON over UDP.
///
/// There is no session token; the challenge and password ride along with
/// every command.
#[derive(Debug)]
pub struct GoldSourceRcon {
    channel: QueryChannel,
    challenge: String,
    password: String,
}

impl GoldSourceRcon {
    pub async fn authorize(endpoint: SocketAddr, password: &str, timeouts: Timeouts) -> Result<Self> {
        let transport = UdpTransport::connect(endpoint, timeouts).await?;
        let channel = QueryChannel::new(transport, EngineType::GoldSource);

        let reply = channel.request(&oob(CHALLENGE_REQUEST)).await?;
        let challenge = parse_challenge(&reply)?;
        debug!("rcon challenge {} from {}", challenge, endpoint);

        let mut rcon = GoldSourceRcon {
            channel,
            challenge,
            password: password.to_owned(),
        };
        let reply = rcon.send_command("").await?;
        if reply.contains(BAD_PASSWORD) {
            debug!("rcon authentication to {} rejected", endpoint);
            rcon.close();
            return Err(AuthError::BadPassword.into());
        }
        Ok(rcon)
    }

    fn command_packet(&self, command: &str) -> Vec<u8> {
        let line = format!(
            "rcon {} \"{}\" {}\0",
            self.challenge, self.password, command
        );
        oob(line.as_bytes())
    }

    /// Send `command`; the reply loses its leading `l` print marker.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        let reply = self.channel.request(&self.command_packet(command)).await?;
        let text = reply.get(1..).unwrap_or_default();
        Ok(String::from_utf8_lossy(text)
            .trim_end_matches('\0')
            .to_owned())
    }

    pub async fn add_log_address(&mut self, ip: IpAddr, port: u16) -> Result<String> {
        self.send_command(&format!("logaddress_add {} {}", ip, port))
            .await
    }

    pub async fn remove_log_address(&mut self, ip: IpAddr, port: u16) -> Result<String> {
        self.send_command(&format!("logaddress_del {} {}", ip, port))
            .await
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

/// Prefix `body` with the connectionless packet header.
fn oob(body: &[u8]) -> Vec<u8> {
    let mut packet = PacketHeader::Single.to_le_bytes().to_vec();
    packet.extend_from_slice(body);
    packet
}

/// Pull the challenge number out of `challenge rcon <number>\n`.
fn parse_challenge(reply: &[u8]) -> std::result::Result<String, ProtocolError> {
    let text = String::from_utf8_lossy(reply);
    text.trim_end_matches(&['\0', '\n', ' '][..])
        .strip_prefix(CHALLENGE_PREFIX)
        .map(str::trim)
        .filter(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit() || b == b'-'))
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::InvalidChallenge {
            raw: reply.to_vec(),
        })
}
