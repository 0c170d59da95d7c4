use std::net::SocketAddr;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs, UdpSocket};
use tokio::time::timeout;

use crate::config::Timeouts;
use crate::error::TransportError;

/// According to the Valve wiki, query responses use 1400 bytes + IP/UDP headers.
pub const UDP_BUFFER_SIZE: usize = 1400;

/// Largest Source RCON packet (4096) plus framing slack.
pub const TCP_BUFFER_SIZE: usize = 4110;

/// A connected UDP socket.
///
/// Connected exactly once, on construction. After [close](Self::close) every
/// call fails with [TransportError::Closed].
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    remote: SocketAddr,
    timeouts: Timeouts,
}

impl UdpTransport {
    pub async fn connect<A: ToSocketAddrs>(
        host: A,
        timeouts: Timeouts,
    ) -> Result<Self, TransportError> {
        // just arbitrarily bind any port, doesn't matter really
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(TransportError::FailedPortBind)?;

        timeout(timeouts.send, socket.connect(host))
            .await?
            .map_err(TransportError::UnreachableHost)?;
        let remote = socket
            .peer_addr()
            .map_err(TransportError::UnreachableHost)?;
        debug!("udp socket connected to {}", remote);

        Ok(UdpTransport {
            socket: Some(socket),
            remote,
            timeouts,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    fn socket(&self) -> Result<&UdpSocket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }

    pub async fn send(&self, data: &[u8]) -> Result<usize, TransportError> {
        let sent = timeout(self.timeouts.send, self.socket()?.send(data))
            .await?
            .map_err(TransportError::SendError)?;
        trace!("sent {} byte(s) to {}", sent, self.remote);
        Ok(sent)
    }

    /// Receive one datagram, truncated to the bytes actually read.
    pub async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        let len = timeout(self.timeouts.receive, self.socket()?.recv(&mut buf))
            .await?
            .map_err(TransportError::ReceiveError)?;
        trace!("received {} byte(s) from {}", len, self.remote);
        Ok(buf[..len].to_vec())
    }

    /// Close the socket. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("udp socket to {} closed", self.remote);
        }
    }
}

/// A connected TCP stream with the same contract as [UdpTransport].
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    remote: SocketAddr,
    timeouts: Timeouts,
}

impl TcpTransport {
    pub async fn connect<A: ToSocketAddrs>(
        host: A,
        timeouts: Timeouts,
    ) -> Result<Self, TransportError> {
        let stream = timeout(timeouts.send, TcpStream::connect(host))
            .await?
            .map_err(TransportError::UnreachableHost)?;
        let remote = stream
            .peer_addr()
            .map_err(TransportError::UnreachableHost)?;
        debug!("tcp stream connected to {}", remote);

        Ok(TcpTransport {
            stream: Some(stream),
            remote,
            timeouts,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let send_timeout = self.timeouts.send;
        timeout(send_timeout, self.stream()?.write_all(data))
            .await?
            .map_err(TransportError::SendError)?;
        trace!("sent {} byte(s) to {}", data.len(), self.remote);
        Ok(data.len())
    }

    /// Receive whatever the peer has sent, up to [TCP_BUFFER_SIZE] bytes.
    ///
    /// A zero-length read means the peer hung up and yields [TransportError::Closed].
    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let receive_timeout = self.timeouts.receive;
        let mut buf = [0u8; TCP_BUFFER_SIZE];
        let len = timeout(receive_timeout, self.stream()?.read(&mut buf))
            .await?
            .map_err(TransportError::ReceiveError)?;
        if len == 0 {
            debug!("tcp stream closed by {}", self.remote);
            return Err(TransportError::Closed);
        }
        trace!("received {} byte(s) from {}", len, self.remote);
        Ok(buf[..len].to_vec())
    }

    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("tcp stream to {} closed", self.remote);
        }
    }
}
