//! Scripted loopback servers and packet builders shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use bzip2::write::BzEncoder;
use bzip2::Compression;
use tokio::net::UdpSocket;

use rsource::config::{FormatHint, SessionConfig, Timeouts};

pub const OOB: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

pub fn fast() -> Timeouts {
    Timeouts::uniform(Duration::from_millis(300))
}

pub fn config(format: FormatHint) -> SessionConfig {
    SessionConfig {
        timeouts: fast(),
        format,
        ..Default::default()
    }
}

/// Bind a UDP responder on loopback. `script` maps each request to the
/// datagrams sent back, in order.
pub async fn spawn_udp<F>(mut script: F) -> SocketAddr
where
    F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(_) => return,
            };
            for reply in script(&buf[..len]) {
                let _ = socket.send_to(&reply, peer).await;
            }
        }
    });
    addr
}

pub fn oob(body: &[u8]) -> Vec<u8> {
    let mut packet = OOB.to_vec();
    packet.extend_from_slice(body);
    packet
}

/// Current-format info payload, starting at the type byte.
pub fn info_payload(hostname: &str, players: u8) -> Vec<u8> {
    let mut p = vec![0x49, 17];
    p.extend_from_slice(hostname.as_bytes());
    p.extend_from_slice(b"\0cp_badlands\0tf\0Team Fortress\0");
    p.extend_from_slice(&440u16.to_le_bytes());
    p.extend_from_slice(&[players, 24, 0, b'd', b'w', 1, 1]);
    p.extend_from_slice(b"7504330\0");
    p.push(0x80);
    p.extend_from_slice(&27015u16.to_le_bytes());
    p
}

pub fn obsolete_info_payload() -> Vec<u8> {
    let mut p = vec![0x6D];
    p.extend_from_slice(b"127.0.0.1:27015\0Classic\0de_dust\0cstrike\0Counter-Strike\0");
    p.extend_from_slice(&[7, 32, 47, b'd', b'l', 0, 0, 1, 0]);
    p
}

pub fn player_payload(players: &[(&str, i32, f32)]) -> Vec<u8> {
    let mut p = vec![0x44, players.len() as u8];
    for (name, score, secs) in players {
        p.push(0);
        p.extend_from_slice(name.as_bytes());
        p.push(0);
        p.extend_from_slice(&score.to_le_bytes());
        p.extend_from_slice(&secs.to_le_bytes());
    }
    p
}

pub fn rules_payload(count: u16) -> Vec<u8> {
    let mut p = vec![0x45];
    p.extend_from_slice(&count.to_le_bytes());
    for i in 0..count {
        p.extend_from_slice(format!("sv_rule_{}\0{}\0", i, i * 10).as_bytes());
    }
    p
}

/// Split an already `oob`-prefixed payload into GoldSource packets.
pub fn goldsource_split(payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = payload.chunks(chunk).collect();
    let count = chunks.len() as u8;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, body)| {
            let mut packet = vec![0xFE, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0];
            packet.push(((index as u8) << 4) | count);
            packet.extend_from_slice(body);
            packet
        })
        .collect()
}

/// Split an already `oob`-prefixed payload into bzip2-compressed Source packets.
pub fn source_split_compressed(payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(payload).unwrap();
    let body = encoder.finish().unwrap();
    let crc = crc32fast::hash(payload);
    let id = i32::MIN | 0x55;

    let chunks: Vec<&[u8]> = body.chunks(chunk).collect();
    let total = chunks.len() as u8;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, part)| {
            let mut packet = (-2i32).to_le_bytes().to_vec();
            packet.extend_from_slice(&id.to_le_bytes());
            packet.push(total);
            packet.push(index as u8);
            packet.extend_from_slice(&1248u16.to_le_bytes());
            if index == 0 {
                packet.extend_from_slice(&(payload.len() as u16).to_le_bytes());
                packet.extend_from_slice(&crc.to_le_bytes());
            }
            packet.extend_from_slice(part);
            packet
        })
        .collect()
}
