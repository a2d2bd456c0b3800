//! PCAP and PCAPNG file reader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use tracing::debug;

use super::RawPacket;
use crate::error::{CaptureError, Result};

/// Buffer size for reading capture files (64KB).
const BUFFER_SIZE: usize = 65536;

/// PCAPNG section header block type.
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Reader for PCAP and PCAPNG files.
pub struct CaptureReader {
    inner: ReaderInner,
    frame_number: u64,
    link_type: u16,
    /// Resolution of legacy record timestamps.
    ts_units: TsUnits,
}

enum ReaderInner {
    Legacy(LegacyPcapReader<BufReader<File>>),
    Ng(PcapNGReader<BufReader<File>>),
}

#[derive(Debug, Clone, Copy)]
enum TsUnits {
    Micros,
    Nanos,
}

impl CaptureReader {
    /// Open a capture file, telling the container format from its magic.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|_| CaptureError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .map_err(|_| CaptureError::InvalidFormat {
                reason: "File too short to read magic number".to_string(),
            })?;

        // Re-open file since we consumed the magic bytes
        let reader = BufReader::with_capacity(BUFFER_SIZE, File::open(path)?);

        match magic {
            [0xd4, 0xc3, 0xb2, 0xa1] | [0xa1, 0xb2, 0xc3, 0xd4] => Self::open_legacy(reader, TsUnits::Micros),
            [0x4d, 0x3c, 0xb2, 0xa1] | [0xa1, 0xb2, 0x3c, 0x4d] => Self::open_legacy(reader, TsUnits::Nanos),
            PCAPNG_MAGIC => Self::open_ng(reader),
            _ => Err(CaptureError::InvalidFormat {
                reason: format!("Unknown magic number: {magic:02x?}"),
            }
            .into()),
        }
    }

    fn open_legacy(reader: BufReader<File>, units: TsUnits) -> Result<Self> {
        let pcap_reader = LegacyPcapReader::new(BUFFER_SIZE, reader).map_err(|e| CaptureError::InvalidFormat {
            reason: format!("Failed to parse PCAP header: {e}"),
        })?;

        Ok(Self {
            inner: ReaderInner::Legacy(pcap_reader),
            frame_number: 0,
            link_type: 1,
            ts_units: units,
        })
    }

    fn open_ng(reader: BufReader<File>) -> Result<Self> {
        let pcap_reader = PcapNGReader::new(BUFFER_SIZE, reader).map_err(|e| CaptureError::InvalidFormat {
            reason: format!("Failed to parse PCAPNG header: {e}"),
        })?;

        Ok(Self {
            inner: ReaderInner::Ng(pcap_reader),
            frame_number: 0,
            link_type: 1, // Updated from the interface description block
            ts_units: TsUnits::Micros,
        })
    }

    /// Get the link type of the capture.
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Get the current frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read every remaining packet.
    pub fn read_all(&mut self) -> Result<Vec<RawPacket>> {
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet()? {
            packets.push(packet);
        }
        debug!(frames = packets.len(), "capture read");
        Ok(packets)
    }

    /// Read the next packet.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        loop {
            let step = match &mut self.inner {
                ReaderInner::Legacy(reader) => {
                    Self::step(reader, &mut self.frame_number, &mut self.link_type, self.ts_units)
                }
                ReaderInner::Ng(reader) => {
                    Self::step(reader, &mut self.frame_number, &mut self.link_type, self.ts_units)
                }
            };
            match step? {
                Step::Packet(packet) => return Ok(Some(packet)),
                Step::Skip => continue,
                Step::Eof => return Ok(None),
            }
        }
    }

    fn step<R: PcapReaderIterator>(
        reader: &mut R,
        frame_number: &mut u64,
        link_type: &mut u16,
        units: TsUnits,
    ) -> Result<Step> {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *link_type = header.network.0 as u16;
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        let sub = match units {
                            TsUnits::Micros => packet.ts_usec as u64,
                            TsUnits::Nanos => packet.ts_usec as u64 / 1_000,
                        };
                        Some((packet.ts_sec as u64 * 1_000_000 + sub, packet.origlen, packet.data.to_vec()))
                    }
                    PcapBlockOwned::NG(ng_block) => {
                        use pcap_parser::pcapng::Block;

                        match ng_block {
                            Block::InterfaceDescription(idb) => {
                                *link_type = idb.linktype.0 as u16;
                                None
                            }
                            Block::EnhancedPacket(epb) => {
                                // Interface time units, microseconds unless if_tsresol says otherwise
                                let ts = ((epb.ts_high as u64) << 32) | (epb.ts_low as u64);
                                Some((ts, epb.origlen, epb.data.to_vec()))
                            }
                            Block::SimplePacket(spb) => Some((0, spb.origlen, spb.data.to_vec())),
                            _ => None,
                        }
                    }
                };
                reader.consume(offset);
                match packet {
                    Some((timestamp_us, origlen, data)) => {
                        *frame_number += 1;
                        Ok(Step::Packet(RawPacket::new(*frame_number, timestamp_us, origlen, *link_type, data)))
                    }
                    None => Ok(Step::Skip),
                }
            }
            Err(PcapError::Eof) => Ok(Step::Eof),
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| CaptureError::InvalidFormat {
                    reason: format!("Refill error: {e}"),
                })?;
                Ok(Step::Skip)
            }
            Err(e) => Err(CaptureError::InvalidFormat {
                reason: format!("Parse error: {e}"),
            }
            .into()),
        }
    }
}

enum Step {
    Packet(RawPacket),
    Skip,
    Eof,
}

/// Iterator adapter for CaptureReader.
impl Iterator for CaptureReader {
    type Item = Result<RawPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FRAME: [u8; 14] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // Dst MAC
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Src MAC
        0x08, 0x06, // EtherType (ARP)
    ];

    fn write_temp(data: &[u8]) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(data).unwrap();
        temp.flush().unwrap();
        temp
    }

    fn block(block_type: u32, body: &[u8]) -> Vec<u8> {
        let len = 12 + body.len() as u32;
        let mut out = block_type.to_le_bytes().to_vec();
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(&len.to_le_bytes());
        out
    }

    /// Section header, one Ethernet interface, one enhanced packet.
    fn create_minimal_pcapng() -> Vec<u8> {
        let mut shb = 0x1A2B_3C4Du32.to_le_bytes().to_vec();
        shb.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // version 1.0
        shb.extend_from_slice(&(-1i64).to_le_bytes()); // section length unknown

        let mut idb = 1u16.to_le_bytes().to_vec(); // Ethernet
        idb.extend_from_slice(&[0x00, 0x00]);
        idb.extend_from_slice(&65535u32.to_le_bytes());

        let ts: u64 = 1_000_000_000_000_123;
        let mut epb = 0u32.to_le_bytes().to_vec(); // interface 0
        epb.extend_from_slice(&((ts >> 32) as u32).to_le_bytes());
        epb.extend_from_slice(&(ts as u32).to_le_bytes());
        epb.extend_from_slice(&(FRAME.len() as u32).to_le_bytes());
        epb.extend_from_slice(&(FRAME.len() as u32).to_le_bytes());
        epb.extend_from_slice(&FRAME);
        epb.extend_from_slice(&[0, 0]); // pad to 32 bits

        let mut data = block(0x0A0D_0D0A, &shb);
        data.extend(block(1, &idb));
        data.extend(block(6, &epb));
        data
    }

    // Test 1: pcapng with an interface description
    #[test]
    fn test_read_pcapng() {
        let temp = write_temp(&create_minimal_pcapng());
        let mut reader = CaptureReader::open(temp.path()).unwrap();
        let packets = reader.read_all().unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].frame_number, 1);
        assert_eq!(packets[0].timestamp_us, 1_000_000_000_000_123);
        assert_eq!(packets[0].data, FRAME);
        assert_eq!(reader.link_type(), 1);
        assert_eq!(reader.frame_count(), 1);
    }

    // Test 2: nanosecond legacy pcap timestamps come out in microseconds
    #[test]
    fn test_nanosecond_pcap() {
        let mut data = vec![0x4d, 0x3c, 0xb2, 0xa1, 0x02, 0x00, 0x04, 0x00];
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&65535u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&5_000u32.to_le_bytes());
        data.extend_from_slice(&(FRAME.len() as u32).to_le_bytes());
        data.extend_from_slice(&(FRAME.len() as u32 + 10).to_le_bytes());
        data.extend_from_slice(&FRAME);

        let temp = write_temp(&data);
        let packets: Vec<_> = CaptureReader::open(temp.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(packets[0].timestamp_us, 10_000_005);
        assert!(packets[0].is_truncated());
    }

    // Test 3: unknown magic and short files
    #[test]
    fn test_invalid_files() {
        assert!(CaptureReader::open(write_temp(&[0x00, 0x01, 0x02, 0x03]).path()).is_err());
        assert!(CaptureReader::open(write_temp(&[0xd4, 0xc3]).path()).is_err());
    }
}
