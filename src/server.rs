use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::net::lookup_host;
use tokio::time::Instant;

use crate::config::{FormatHint, SessionConfig};
use crate::error::{Error, ParseError, ProtocolError, Result, TransportError};
use crate::info::ServerInfo;
use crate::packet::{Challenge, EngineType, RequestPacket, ResponseType};
use crate::player::Player;
use crate::query::QueryChannel;
use crate::rcon::RconSession;
use crate::rule::Rule;
use crate::transport::UdpTransport;

/// Which info layout a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Current,
    Obsolete,
}

/// What a session knows about a server's player/rule challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChallengeState {
    Unknown,
    Required(Challenge),
    /// The server answered the challenge request with data directly.
    NotRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Players,
    Rules,
}

impl Listing {
    fn request(self, challenge: Challenge) -> RequestPacket {
        match self {
            Listing::Players => RequestPacket::Player(challenge),
            Listing::Rules => RequestPacket::Rules(challenge),
        }
    }

    fn response(self) -> ResponseType {
        match self {
            Listing::Players => ResponseType::Player,
            Listing::Rules => ResponseType::Rules,
        }
    }
}

/// Query session bound to one server for its whole lifetime.
///
/// Challenges for players and rules are cached separately and reused until
/// the session is closed.
#[derive(Debug)]
pub struct ServerSession {
    endpoint: SocketAddr,
    config: SessionConfig,
    channel: QueryChannel,
    format: Format,
    player_challenge: ChallengeState,
    rules_challenge: ChallengeState,
    rcon: Option<RconSession>,
}

impl ServerSession {
    /// Connect to `endpoint` and settle the info format as `config.format` says.
    pub async fn connect(
        endpoint: SocketAddr,
        engine: EngineType,
        config: SessionConfig,
    ) -> Result<Self> {
        let transport = UdpTransport::connect(endpoint, config.timeouts).await?;
        let mut session = ServerSession {
            endpoint,
            config,
            channel: QueryChannel::new(transport, engine),
            format: Format::Current,
            player_challenge: ChallengeState::Unknown,
            rules_challenge: ChallengeState::Unknown,
            rcon: None,
        };
        match config.format {
            FormatHint::Probe => {
                session.probe_format().await?;
            }
            FormatHint::Current => session.format = Format::Current,
            FormatHint::Obsolete => session.format = Format::Obsolete,
        }
        Ok(session)
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn engine(&self) -> EngineType {
        self.channel.engine()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Ask with the legacy info query and lock the session to whichever
    /// format answers. A server that stays silent is taken as current.
    pub async fn probe_format(&mut self) -> Result<Format> {
        let format = match self
            .channel
            .request(&RequestPacket::obsolete_info().pack())
            .await
        {
            Ok(reply) if reply.first() == Some(&ResponseType::ObsoleteInfo.to_byte()) => {
                Format::Obsolete
            }
            Ok(_) => Format::Current,
            Err(e) if e.is_timeout() => Format::Current,
            Err(e) => return Err(e),
        };
        debug!("{} speaks the {:?} info format", self.endpoint, format);
        self.format = format;
        Ok(format)
    }

    fn info_request(&self) -> RequestPacket {
        match self.format {
            Format::Current => RequestPacket::info(),
            Format::Obsolete => RequestPacket::obsolete_info(),
        }
    }

    /// Send an info request, re-sending with the server's challenge when it
    /// answers with one instead of data.
    async fn info_exchange(&self) -> Result<Vec<u8>> {
        let mut request = self.info_request();
        let mut challenges = 0;
        loop {
            let reply = self.channel.request(&request.pack()).await?;
            if reply.first() != Some(&ResponseType::Challenge.to_byte()) {
                return Ok(reply);
            }
            if challenges >= self.config.challenge_retries {
                return Err(ProtocolError::ChallengeLoop { raw: reply }.into());
            }
            challenges += 1;
            debug!("{} challenged the info request", self.endpoint);
            request = request.with_challenge(&reply[1..]);
        }
    }

    pub async fn get_info(&mut self) -> Result<ServerInfo> {
        let started = Instant::now();
        let reply = self.info_exchange().await?;
        let latency = started.elapsed();
        Ok(ServerInfo::parse(&reply, latency)?)
    }

    /// Round-trip time of an info exchange; the reply is not parsed.
    pub async fn ping(&mut self) -> Result<Duration> {
        let started = Instant::now();
        self.info_exchange().await?;
        Ok(started.elapsed())
    }

    pub async fn get_players(&mut self) -> Result<Vec<Player>> {
        let reply = self.listing_exchange(Listing::Players).await?;
        Ok(Player::parse_list(&reply)?)
    }

    pub async fn get_rules(&mut self) -> Result<Vec<Rule>> {
        let reply = self.listing_exchange(Listing::Rules).await?;
        Ok(Rule::parse_list(&reply)?)
    }

    fn challenge_slot(&mut self, listing: Listing) -> &mut ChallengeState {
        match listing {
            Listing::Players => &mut self.player_challenge,
            Listing::Rules => &mut self.rules_challenge,
        }
    }

    fn challenge_request(&self, listing: Listing) -> RequestPacket {
        match self.format {
            Format::Current => listing.request(Challenge::REQUEST),
            Format::Obsolete => RequestPacket::GetChallenge,
        }
    }

    async fn listing_exchange(&mut self, listing: Listing) -> Result<Vec<u8>> {
        let mut challenges = 0;
        loop {
            let state = *self.challenge_slot(listing);
            let request = match state {
                ChallengeState::Required(challenge) => listing.request(challenge),
                ChallengeState::Unknown | ChallengeState::NotRequired => {
                    self.challenge_request(listing)
                }
            };
            let reply = self.channel.request(&request.pack()).await?;

            match reply.first().copied().and_then(ResponseType::from_byte) {
                Some(ResponseType::Challenge) => {
                    if challenges >= self.config.challenge_retries {
                        return Err(ProtocolError::ChallengeLoop { raw: reply }.into());
                    }
                    challenges += 1;
                    let Some(challenge) = Challenge::from_slice(&reply[1..]) else {
                        let short = ParseError::OutOfBounds {
                            offset: 1,
                            wanted: 4,
                            len: reply.len(),
                        };
                        return Err(ProtocolError::malformed(short, &reply).into());
                    };
                    debug!("{} issued {:?} challenge {:?}", self.endpoint, listing, challenge);
                    *self.challenge_slot(listing) = ChallengeState::Required(challenge);
                }
                Some(kind) if kind == listing.response() => {
                    if state == ChallengeState::Unknown {
                        debug!("{} answers {:?} without a challenge", self.endpoint, listing);
                        *self.challenge_slot(listing) = ChallengeState::NotRequired;
                    }
                    return Ok(reply);
                }
                _ => {
                    return Err(ProtocolError::UnexpectedType {
                        expected: listing.response().to_byte(),
                        found: reply.first().copied().unwrap_or(0),
                        raw: reply,
                    }
                    .into())
                }
            }
        }
    }

    /// Authorize an RCON session on the same server, owned by this session.
    ///
    /// An existing session is replaced.
    pub async fn get_control(&mut self, password: &str) -> Result<&mut RconSession> {
        if let Some(mut old) = self.rcon.take() {
            old.close();
        }
        let rcon =
            RconSession::authorize(self.endpoint, self.engine(), password, self.config.timeouts)
                .await?;
        Ok(self.rcon.insert(rcon))
    }

    pub fn control(&mut self) -> Option<&mut RconSession> {
        self.rcon.as_mut()
    }

    /// Close the query socket and any owned RCON session.
    pub fn close(&mut self) {
        self.channel.close();
        if let Some(mut rcon) = self.rcon.take() {
            rcon.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

/// Query `host` with the A2S_INFO query.
///
/// If `timeout_dur` is `Some(Duration)`, each socket operation will use `timeout_dur`.
/// The default is 5 seconds if `timeout_dur` is `None`.
///
/// Example usage:
/// ```no_run
/// # async fn run() -> rsource::error::Result<()> {
/// let host: &str = "nyc-1.us.uncletopia.com:27015"; // Uncletopia New York City 4
/// let info = rsource::query(host, None).await?;
/// println!("{} on {}", info.hostname(), info.map());
/// # Ok(())
/// # }
/// ```
pub async fn query(host: &str, timeout_dur: Option<Duration>) -> Result<ServerInfo> {
    let config = timeout_dur
        .map(SessionConfig::with_timeout)
        .unwrap_or_default()
        .format(FormatHint::Current);
    let endpoint = lookup_host(host)
        .await
        .map_err(TransportError::UnreachableHost)?
        .next()
        .ok_or_else(|| {
            Error::from(TransportError::UnreachableHost(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} did not resolve", host),
            )))
        })?;
    let mut session = ServerSession::connect(endpoint, EngineType::Source, config).await?;
    session.get_info().await
}
