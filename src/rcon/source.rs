use std::net::{IpAddr, SocketAddr};

use log::{debug, warn};

use super::packet::{
    ControlChannel, RconPacket, AUTH, AUTH_FAILED_ID, AUTH_RESPONSE, EMPTY_ID, EXEC, EXEC_ID,
};
use crate::config::Timeouts;
use crate::error::{AuthError, Result};
use crate::transport::TcpTransport;

/// Source RCON over TCP. The session is authenticated once, up front.
#[derive(Debug)]
pub struct SourceRcon {
    channel: ControlChannel,
}

impl SourceRcon {
    /// Connect and authenticate.
    ///
    /// A wrong password fails here with [AuthError::BadPassword] rather than
    /// on the first command.
    pub async fn authorize(endpoint: SocketAddr, password: &str, timeouts: Timeouts) -> Result<Self> {
        let transport = TcpTransport::connect(endpoint, timeouts).await?;
        let mut rcon = SourceRcon {
            channel: ControlChannel::new(transport),
        };
        rcon.channel
            .send(&RconPacket::new(EXEC_ID, AUTH, password))
            .await?;

        // servers send an empty exec response ahead of the auth response
        loop {
            let packet = rcon.channel.receive().await?;
            if packet.kind != AUTH_RESPONSE {
                debug!("skipping rcon packet of type {} before auth response", packet.kind);
                continue;
            }
            if packet.id == AUTH_FAILED_ID {
                debug!("rcon authentication to {} rejected", endpoint);
                rcon.close();
                return Err(AuthError::BadPassword.into());
            }
            debug!("rcon authenticated to {}", endpoint);
            return Ok(rcon);
        }
    }

    /// Run `command` and collect its whole output.
    ///
    /// An empty sentinel packet follows the command; the server answers in
    /// order, so its echo marks the end of a possibly multi-packet response.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        self.channel
            .send(&RconPacket::new(EXEC_ID, EXEC, command))
            .await?;
        self.channel
            .send(&RconPacket::new(EMPTY_ID, EXEC, ""))
            .await?;

        let mut output = String::new();
        let mut answered = false;
        loop {
            let packet = self.channel.receive().await?;
            match packet.id {
                EXEC_ID => {
                    answered = true;
                    output.push_str(&packet.body);
                }
                EMPTY_ID if answered => break,
                EMPTY_ID => continue,
                AUTH_FAILED_ID => return Err(AuthError::NotAuthorized.into()),
                other => warn!("ignoring rcon packet with unexpected id {}", other),
            }
        }
        Ok(output)
    }

    pub async fn add_log_address(&mut self, ip: IpAddr, port: u16) -> Result<String> {
        self.send_command(&format!("logaddress_add {}:{}", ip, port))
            .await
    }

    pub async fn remove_log_address(&mut self, ip: IpAddr, port: u16) -> Result<String> {
        self.send_command(&format!("logaddress_del {}:{}", ip, port))
            .await
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
