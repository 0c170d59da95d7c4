use std::io::Read;

use bzip2::read::BzDecoder;
use log::{debug, trace};

use crate::error::{ParseError, ProtocolError, Result};
use crate::packet::{EngineType, PacketHeader};
use crate::parse::BinaryCursor;
use crate::transport::UdpTransport;

const GOLDSOURCE_COUNT_OFFSET: usize = 8;
const GOLDSOURCE_FIRST_PAYLOAD: usize = 13;
const GOLDSOURCE_PAYLOAD: usize = 9;

const SOURCE_COUNT_OFFSET: usize = 8;
const SOURCE_HEADER_LEN: usize = 12;

/// UDP request/response exchange for the A2S family.
///
/// Hands back payloads that are complete: split responses are gathered,
/// sorted, concatenated and, when compressed, inflated and checksummed before
/// anything is returned. The payload starts at the response type byte.
#[derive(Debug)]
pub struct QueryChannel {
    transport: UdpTransport,
    engine: EngineType,
}

impl QueryChannel {
    pub fn new(transport: UdpTransport, engine: EngineType) -> Self {
        QueryChannel { transport, engine }
    }

    pub fn engine(&self) -> EngineType {
        self.engine
    }

    pub fn transport(&self) -> &UdpTransport {
        &self.transport
    }

    /// Send `request` and wait for the complete reply.
    pub async fn request(&self, request: &[u8]) -> Result<Vec<u8>> {
        self.transport.send(request).await?;
        self.receive().await
    }

    /// Receive one logical response, which may span several datagrams.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let first = self.transport.receive().await?;
        match PacketHeader::parse(&first)? {
            PacketHeader::Single => Ok(first[4..].to_vec()),
            PacketHeader::Split => {
                let count = split_count(self.engine, &first)?;
                debug!(
                    "{:?} split response from {}: {} packet(s)",
                    self.engine,
                    self.transport.remote(),
                    count
                );
                let mut packets = Vec::with_capacity(count);
                packets.push(first);
                while packets.len() < count {
                    let packet = self.transport.receive().await?;
                    if PacketHeader::parse(&packet)? != PacketHeader::Split {
                        return Err(ProtocolError::InvalidSplit {
                            reason: "single packet arrived inside a split response",
                            raw: packet,
                        }
                        .into());
                    }
                    packets.push(packet);
                }
                let payload = match self.engine {
                    EngineType::GoldSource => reassemble_goldsource(packets)?,
                    EngineType::Source => reassemble_source(packets)?,
                };
                Ok(payload)
            }
        }
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }
}

/// Number of datagrams announced by the first split packet.
fn split_count(engine: EngineType, first: &[u8]) -> std::result::Result<usize, ProtocolError> {
    let count = match engine {
        EngineType::GoldSource => first.get(GOLDSOURCE_COUNT_OFFSET).map(|b| b & 0x0F),
        EngineType::Source => first.get(SOURCE_COUNT_OFFSET).copied(),
    };
    match count {
        Some(0) => Err(ProtocolError::InvalidSplit {
            reason: "packet count is zero",
            raw: first.to_vec(),
        }),
        Some(n) => Ok(n as usize),
        None => Err(ProtocolError::InvalidSplit {
            reason: "split header is truncated",
            raw: first.to_vec(),
        }),
    }
}

/// Sort `(index, packet)` pairs and check the indices are exactly `0..len`.
fn order_by_index(
    mut indexed: Vec<(u8, Vec<u8>)>,
) -> std::result::Result<Vec<Vec<u8>>, ProtocolError> {
    indexed.sort_by_key(|(index, _)| *index);
    for (expected, (index, packet)) in indexed.iter().enumerate() {
        if *index as usize != expected {
            return Err(ProtocolError::InvalidSplit {
                reason: "packet indices are not contiguous",
                raw: packet.clone(),
            });
        }
    }
    Ok(indexed.into_iter().map(|(_, packet)| packet).collect())
}

/// Join GoldSource split packets.
///
/// The high nibble of byte 8 is each packet's index. The first packet still
/// carries the single-packet header, so its payload starts 4 bytes later.
pub fn reassemble_goldsource(
    packets: Vec<Vec<u8>>,
) -> std::result::Result<Vec<u8>, ProtocolError> {
    let indexed = packets
        .into_iter()
        .map(|packet| match packet.get(GOLDSOURCE_COUNT_OFFSET).copied() {
            Some(b) => Ok((b >> 4, packet)),
            None => Err(ProtocolError::InvalidSplit {
                reason: "split header is truncated",
                raw: packet,
            }),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut payload = Vec::new();
    for (n, packet) in order_by_index(indexed)?.iter().enumerate() {
        let start = if n == 0 {
            GOLDSOURCE_FIRST_PAYLOAD
        } else {
            GOLDSOURCE_PAYLOAD
        };
        let mut cursor = BinaryCursor::new(packet);
        cursor
            .skip(start)
            .map_err(|e| ProtocolError::malformed(e, packet))?;
        payload.extend_from_slice(cursor.remaining());
    }
    trace!("reassembled {} byte goldsource payload", payload.len());
    Ok(payload)
}

/// The 12-byte header on every Source split packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceSplitHeader {
    id: i32,
    total: u8,
    index: u8,
    size: u16,
}

impl SourceSplitHeader {
    fn read(cursor: &mut BinaryCursor) -> std::result::Result<Self, ParseError> {
        cursor.skip(4)?;
        Ok(SourceSplitHeader {
            id: cursor.read_i32_le()?,
            total: cursor.read_u8()?,
            index: cursor.read_u8()?,
            size: cursor.read_u16_le()?,
        })
    }

    /// The sign bit of the response id marks a bzip2 payload.
    fn is_compressed(&self) -> bool {
        self.id < 0
    }
}

/// Join Source split packets, inflating and verifying compressed payloads.
pub fn reassemble_source(packets: Vec<Vec<u8>>) -> std::result::Result<Vec<u8>, ProtocolError> {
    let mut indexed = Vec::with_capacity(packets.len());
    let mut first_header: Option<SourceSplitHeader> = None;
    for packet in packets {
        let header = SourceSplitHeader::read(&mut BinaryCursor::new(&packet))
            .map_err(|e| ProtocolError::malformed(e, &packet))?;
        match first_header {
            None => first_header = Some(header),
            Some(first) if first.id != header.id => {
                return Err(ProtocolError::InvalidSplit {
                    reason: "packets belong to different responses",
                    raw: packet,
                })
            }
            Some(_) => {}
        }
        trace!(
            "split packet {}/{} ({} byte(s))",
            header.index,
            header.total,
            header.size
        );
        indexed.push((header.index, packet));
    }
    let compressed = first_header.map_or(false, |h| h.is_compressed());

    let ordered = order_by_index(indexed)?;
    let mut joined = Vec::new();
    let mut checksum = None;
    for (n, packet) in ordered.iter().enumerate() {
        let mut cursor = BinaryCursor::new(packet);
        cursor
            .skip(SOURCE_HEADER_LEN)
            .map_err(|e| ProtocolError::malformed(e, packet))?;
        if n == 0 && compressed {
            let (hint, crc) = read_compression_header(&mut cursor)
                .map_err(|e| ProtocolError::malformed(e, packet))?;
            joined.reserve(hint as usize);
            checksum = Some(crc);
        }
        joined.extend_from_slice(cursor.remaining());
    }

    let payload = match checksum {
        Some(expected) => decompress(joined, expected)?,
        None => joined,
    };

    let mut cursor = BinaryCursor::new(&payload);
    cursor
        .skip(4)
        .map_err(|e| ProtocolError::malformed(e, &payload))?;
    Ok(cursor.remaining().to_vec())
}

/// Decompressed-size hint and CRC32, present on packet 0 of compressed responses.
fn read_compression_header(cursor: &mut BinaryCursor) -> std::result::Result<(u16, u32), ParseError> {
    let hint = cursor.read_u16_le()?;
    let crc = cursor.read_u32_le()?;
    Ok((hint, crc))
}

/// Inflate a bzip2 payload and check it against the CRC32 from packet 0.
fn decompress(compressed: Vec<u8>, expected: u32) -> std::result::Result<Vec<u8>, ProtocolError> {
    let mut decompressed = Vec::new();
    let inflated = BzDecoder::new(compressed.as_slice()).read_to_end(&mut decompressed);
    if let Err(source) = inflated {
        return Err(ProtocolError::Decompress {
            source,
            raw: compressed,
        });
    }
    let computed = crc32fast::hash(&decompressed);
    if computed != expected {
        return Err(ProtocolError::ChecksumMismatch {
            expected,
            computed,
            raw: decompressed,
        });
    }
    debug!(
        "decompressed {} byte(s) into {} byte(s)",
        compressed.len(),
        decompressed.len()
    );
    Ok(decompressed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    /// Split `payload` (which includes its -1 header) into GoldSource packets.
    pub(crate) fn goldsource_split(payload: &[u8], chunk: usize) -> Vec<Vec<u8>> {
        let chunks: Vec<&[u8]> = payload.chunks(chunk).collect();
        let count = chunks.len() as u8;
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, body)| {
                let mut packet = vec![0xFE, 0xFF, 0xFF, 0xFF, 0x2A, 0, 0, 0];
                packet.push(((index as u8) << 4) | count);
                packet.extend_from_slice(body);
                packet
            })
            .collect()
    }

    /// Split `payload` into Source packets, compressing when asked.
    pub(crate) fn source_split(payload: &[u8], chunk: usize, compress: bool) -> Vec<Vec<u8>> {
        let (body, crc) = if compress {
            let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(payload).unwrap();
            (encoder.finish().unwrap(), Some(crc32fast::hash(payload)))
        } else {
            (payload.to_vec(), None)
        };
        let id: i32 = if compress { i32::MIN | 7 } else { 7 };
        let chunks: Vec<&[u8]> = body.chunks(chunk).collect();
        let total = chunks.len() as u8;
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let mut packet = Vec::new();
                packet.extend_from_slice(&(-2i32).to_le_bytes());
                packet.extend_from_slice(&id.to_le_bytes());
                packet.push(total);
                packet.push(index as u8);
                packet.extend_from_slice(&1248u16.to_le_bytes());
                if index == 0 {
                    if let Some(crc) = crc {
                        packet.extend_from_slice(&(payload.len() as u16).to_le_bytes());
                        packet.extend_from_slice(&crc.to_le_bytes());
                    }
                }
                packet.extend_from_slice(part);
                packet
            })
            .collect()
    }

    fn rules_payload() -> Vec<u8> {
        let mut payload = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x45, 40, 0];
        for i in 0..40 {
            payload.extend_from_slice(format!("sv_rule_{}\0value_{}\0", i, i).as_bytes());
        }
        payload
    }

    #[test]
    fn goldsource_order_does_not_matter() {
        let payload = rules_payload();
        let in_order = goldsource_split(&payload, 100);
        assert!(in_order.len() > 3);

        let mut shuffled = in_order.clone();
        shuffled.reverse();
        shuffled.swap(0, 1);

        let a = reassemble_goldsource(in_order).unwrap();
        let b = reassemble_goldsource(shuffled).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, payload[4..].to_vec());
    }

    #[test]
    fn goldsource_duplicate_index_is_rejected() {
        let payload = rules_payload();
        let mut packets = goldsource_split(&payload, 200);
        packets[1] = packets[0].clone();
        assert!(matches!(
            reassemble_goldsource(packets),
            Err(ProtocolError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn source_uncompressed_out_of_order() {
        let payload = rules_payload();
        let mut packets = source_split(&payload, 120, false);
        packets.rotate_left(2);
        assert_eq!(reassemble_source(packets).unwrap(), payload[4..].to_vec());
    }

    #[test]
    fn source_compressed_round_trip() {
        let payload = rules_payload();
        let packets = source_split(&payload, 64, true);
        assert_eq!(reassemble_source(packets).unwrap(), payload[4..].to_vec());
    }

    #[test]
    fn source_compressed_checksum_mismatch() {
        let payload = rules_payload();
        let mut tampered = payload.clone();
        tampered[20] ^= 0x01;

        // packets carry the checksum of the original but the bytes of the tampered payload
        let honest = source_split(&payload, 64, true);
        let mut packets = source_split(&tampered, 64, true);
        packets[0][14..18].copy_from_slice(&honest[0][14..18]);

        assert!(matches!(
            reassemble_source(packets),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn source_mixed_response_ids_are_rejected() {
        let payload = rules_payload();
        let mut packets = source_split(&payload, 120, false);
        packets[1][4] = 0x99;
        assert!(matches!(
            reassemble_source(packets),
            Err(ProtocolError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn split_count_per_engine() {
        let packet = [0xFE, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0x23, 0x05];
        assert_eq!(split_count(EngineType::GoldSource, &packet).unwrap(), 3);
        assert_eq!(split_count(EngineType::Source, &packet).unwrap(), 0x23);
        assert!(split_count(EngineType::Source, &packet[..8]).is_err());
    }
}
