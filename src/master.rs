use std::fmt::Write as _;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::config::Timeouts;
use crate::error::{Error, ParseError, ProtocolError, Result};
use crate::packet::PacketHeader;
use crate::parse::BinaryCursor;
use crate::transport::UdpTransport;

pub const DEFAULT_MASTER_SERVER: &str = "hl2master.steampowered.com:27011";

/// First seed of an enumeration, and the address that marks its end.
pub const SEED: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

const QUERY: u8 = 0x31;
const REPLY: u8 = 0x66;
const REPLY_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Region {
    UsEast = 0x00,
    UsWest = 0x01,
    SouthAmerica = 0x02,
    Europe = 0x03,
    Asia = 0x04,
    Australia = 0x05,
    MiddleEast = 0x06,
    Africa = 0x07,
    RestOfWorld = 0xFF,
}

/// Master server filter.
///
/// Unset, false and empty fields add nothing to the encoded string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub is_dedicated: bool,
    pub is_secure: bool,
    pub game_dir: Option<String>,
    pub map: Option<String>,
    pub is_linux: bool,
    pub is_not_empty: bool,
    pub is_not_full: bool,
    /// Spectator proxies only.
    pub is_proxy: bool,
    pub app_id: Option<u32>,
    /// Exclude servers running this app.
    pub napp_id: Option<u32>,
    pub is_no_players: bool,
    pub is_whitelisted: bool,
    /// `sv_tags`, all required
    pub tags: Vec<String>,
    /// Hidden tags, all required (L4D2)
    pub game_data: Vec<String>,
    /// Hidden tags, any required (L4D2)
    pub game_data_or: Vec<String>,
    /// Hostname wildcard
    pub name_match: Option<String>,
    /// Version wildcard
    pub version_match: Option<String>,
    /// One server per unique IP
    pub collapse_addr_hash: bool,
    /// Servers on this IP, optionally with a port
    pub game_addr: Option<String>,
}

impl Filter {
    /// Serialize to `\key\value` tokens.
    ///
    /// Token order is fixed; some master server implementations care.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let flag = |out: &mut String, on: bool, key: &str| {
            if on {
                let _ = write!(out, "\\{}\\1", key);
            }
        };
        let text = |out: &mut String, key: &str, value: Option<&str>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                let _ = write!(out, "\\{}\\{}", key, v);
            }
        };
        let list = |out: &mut String, key: &str, values: &[String]| {
            let joined = values
                .iter()
                .filter(|v| !v.is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            if !joined.is_empty() {
                let _ = write!(out, "\\{}\\{}", key, joined);
            }
        };

        if self.is_dedicated {
            out.push_str("\\type\\d");
        }
        flag(&mut out, self.is_secure, "secure");
        text(&mut out, "gamedir", self.game_dir.as_deref());
        text(&mut out, "map", self.map.as_deref());
        flag(&mut out, self.is_linux, "linux");
        flag(&mut out, self.is_not_empty, "empty");
        flag(&mut out, self.is_not_full, "full");
        flag(&mut out, self.is_proxy, "proxy");
        if let Some(id) = self.app_id {
            let _ = write!(out, "\\appid\\{}", id);
        }
        if let Some(id) = self.napp_id {
            let _ = write!(out, "\\napp\\{}", id);
        }
        flag(&mut out, self.is_no_players, "noplayers");
        flag(&mut out, self.is_whitelisted, "white");
        list(&mut out, "gametype", &self.tags);
        list(&mut out, "gamedata", &self.game_data);
        list(&mut out, "gamedataor", &self.game_data_or);
        text(&mut out, "name_match", self.name_match.as_deref());
        text(&mut out, "version_match", self.version_match.as_deref());
        flag(&mut out, self.collapse_addr_hash, "collapse_addr_hash");
        text(&mut out, "gameaddr", self.game_addr.as_deref());
        out
    }
}

/// `[0x31][region][seed]\0[filter]\0`
pub fn request_packet(region: Region, seed: SocketAddr, filter: &str) -> Vec<u8> {
    let seed = seed.to_string();
    let mut packet = Vec::with_capacity(4 + seed.len() + filter.len());
    packet.push(QUERY);
    packet.push(region as u8);
    packet.extend_from_slice(seed.as_bytes());
    packet.push(0);
    packet.extend_from_slice(filter.as_bytes());
    packet.push(0);
    packet
}

/// Decode one master server reply into the endpoints it lists.
pub fn parse_batch(reply: &[u8]) -> std::result::Result<Vec<SocketAddr>, ProtocolError> {
    if PacketHeader::parse(reply)? != PacketHeader::Single {
        return Err(ProtocolError::InvalidHeader {
            header: PacketHeader::SPLIT,
            raw: reply.to_vec(),
        });
    }
    match reply.get(4) {
        Some(&REPLY) => {}
        found => {
            return Err(ProtocolError::UnexpectedType {
                expected: REPLY,
                found: found.copied().unwrap_or(0),
                raw: reply.to_vec(),
            })
        }
    }

    read_endpoints(&mut BinaryCursor::new(reply)).map_err(|e| ProtocolError::malformed(e, reply))
}

fn read_endpoints(cursor: &mut BinaryCursor<'_>) -> std::result::Result<Vec<SocketAddr>, ParseError> {
    cursor.skip(REPLY_HEADER_LEN)?;
    let mut batch = Vec::with_capacity(cursor.remaining().len() / 6);
    while !cursor.is_empty() {
        let ip = cursor.take(4)?;
        let port = cursor.read_u16_be()?;
        batch.push(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
            port,
        )));
    }
    Ok(batch)
}

/// Resets the listening flag however enumeration ends, including when the
/// future is dropped.
struct Listening<'a>(&'a AtomicBool);

impl Drop for Listening<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Enumerates game servers known to a master server.
#[derive(Debug)]
pub struct MasterDirectory {
    master: String,
    timeouts: Timeouts,
    listening: AtomicBool,
}

impl MasterDirectory {
    pub fn new(master: impl Into<String>, timeouts: Timeouts) -> Self {
        MasterDirectory {
            master: master.into(),
            timeouts,
            listening: AtomicBool::new(false),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Page through every server matching `filter`, handing each reply's
    /// endpoints to `sink`.
    ///
    /// Each follow-up request is seeded with the last endpoint of the
    /// previous batch. Enumeration ends when a batch ends with [SEED], which
    /// is stripped before the batch reaches `sink`. A master that answers
    /// with the seed it was just given fails with
    /// [ProtocolError::StalledEnumeration]. Only one enumeration may
    /// run at a time; a second call fails with [Error::Busy].
    pub async fn enumerate<F>(&self, region: Region, filter: &Filter, mut sink: F) -> Result<()>
    where
        F: FnMut(Vec<SocketAddr>),
    {
        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }
        let _listening = Listening(&self.listening);

        let mut transport = UdpTransport::connect(self.master.as_str(), self.timeouts).await?;
        let filter = filter.encode();
        let mut seed = SEED;
        let mut batches = 0usize;
        loop {
            transport
                .send(&request_packet(region, seed, &filter))
                .await?;
            let reply = transport.receive().await?;
            let mut batch = parse_batch(&reply)?;
            batches += 1;

            let last = batch.last().copied();
            if last == Some(SEED) {
                batch.pop();
            }
            debug!(
                "master batch {} from {}: {} server(s)",
                batches,
                transport.remote(),
                batch.len()
            );
            sink(batch);

            match last {
                Some(next) if next == SEED => break,
                Some(next) if next == seed => {
                    return Err(ProtocolError::StalledEnumeration { seed, raw: reply }.into());
                }
                Some(next) => seed = next,
                None => break,
            }
        }
        transport.close();
        debug!("master enumeration finished after {} batch(es)", batches);
        Ok(())
    }

    /// Enumerate and gather every endpoint.
    pub async fn collect(&self, region: Region, filter: &Filter) -> Result<Vec<SocketAddr>> {
        let mut servers = Vec::new();
        self.enumerate(region, filter, |batch| servers.extend(batch))
            .await?;
        Ok(servers)
    }
}
