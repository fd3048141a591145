use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use chrono::{DateTime, Utc};
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::*;

use crate::error::{ConvertError, Result};
use crate::models::{FlowKey, TransportProtocol};

/// Reader buffer; must hold the largest single block in the file.
const BUFFER_SIZE: usize = 1 << 20;

// ---------------------------------------------------------------------------
// Capture container detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Pcap,
    PcapNanos,
    PcapNg,
}

pub fn detect_format(magic: &[u8]) -> Option<CaptureFormat> {
    match magic.get(..4)? {
        [0xd4, 0xc3, 0xb2, 0xa1] | [0xa1, 0xb2, 0xc3, 0xd4] => Some(CaptureFormat::Pcap),
        [0x4d, 0x3c, 0xb2, 0xa1] | [0xa1, 0xb2, 0x3c, 0x4d] => Some(CaptureFormat::PcapNanos),
        [0x0a, 0x0d, 0x0d, 0x0a] => Some(CaptureFormat::PcapNg),
        _ => None,
    }
}

pub fn sniff_format(path: &Path) -> Result<Option<CaptureFormat>> {
    let mut file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..]).map_err(|e| ConvertError::io(path, e))?;
        if n == 0 {
            return Ok(None);
        }
        filled += n;
    }
    Ok(detect_format(&magic))
}

// ---------------------------------------------------------------------------
// ParsedPacket: the normalized output of the ingest layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ParsedPacket<'a> {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    /// Length on the wire, not the captured length
    pub wire_len: u32,
    pub key: FlowKey,
    pub tcp_flags: Option<TcpFlags>,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub total_frames: u64,
    pub decoded: u64,
    pub parse_errors: u64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl IngestSummary {
    fn update_timestamps(&mut self, ts: DateTime<Utc>) {
        if self.first_timestamp.map_or(true, |first| ts < first) {
            self.first_timestamp = Some(ts);
        }
        if self.last_timestamp.map_or(true, |last| ts > last) {
            self.last_timestamp = Some(ts);
        }
    }
}

// ---------------------------------------------------------------------------
// PcapIngestor: streaming reader for pcap/pcapng files
// ---------------------------------------------------------------------------

struct Interface {
    linktype: Linktype,
    /// Timestamp units per second
    tsresol: u64,
}

pub struct PcapIngestor {
    interfaces: Vec<Interface>,
    nanosecond: bool,
    summary: IngestSummary,
}

impl PcapIngestor {
    /// Stream every decodable frame of `path` to `on_packet`, in file order.
    pub fn stream<F>(path: &Path, mut on_packet: F) -> Result<IngestSummary>
    where
        F: FnMut(&ParsedPacket<'_>),
    {
        let format = sniff_format(path)?.ok_or_else(|| {
            ConvertError::format(path, crate::models::SampleType::Pcap, "unknown capture magic")
        })?;

        tracing::info!(file = %path.display(), ?format, "streaming capture");

        let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
        let mut ingestor = Self {
            interfaces: Vec::new(),
            nanosecond: format == CaptureFormat::PcapNanos,
            summary: IngestSummary::default(),
        };

        match format {
            CaptureFormat::PcapNg => ingestor.read_pcapng(file, &mut on_packet)?,
            _ => ingestor.read_pcap(file, &mut on_packet)?,
        }

        tracing::info!(
            frames = ingestor.summary.total_frames,
            decoded = ingestor.summary.decoded,
            errors = ingestor.summary.parse_errors,
            "capture read complete"
        );
        Ok(ingestor.summary)
    }

    fn read_pcap<F>(&mut self, file: File, on_packet: &mut F) -> Result<()>
    where
        F: FnMut(&ParsedPacket<'_>),
    {
        let mut reader = LegacyPcapReader::new(BUFFER_SIZE, file)
            .map_err(|e| ConvertError::Capture(format!("failed to create pcap reader: {e:?}")))?;
        let mut stalled = false;

        loop {
            match reader.next() {
                Ok((consumed, block)) => {
                    stalled = false;
                    match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            self.nanosecond |= header.is_nanosecond_precision();
                            self.interfaces = vec![Interface {
                                linktype: header.network,
                                tsresol: if self.nanosecond { 1_000_000_000 } else { 1_000_000 },
                            }];
                        }
                        PcapBlockOwned::Legacy(packet) => {
                            let nanos = if self.nanosecond {
                                packet.ts_usec
                            } else {
                                packet.ts_usec.saturating_mul(1000)
                            };
                            let ts = pcap_ts_to_datetime(packet.ts_sec as i64, nanos);
                            self.frame(0, packet.data, ts, packet.origlen, on_packet);
                        }
                        _ => {}
                    }
                    reader.consume(consumed);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    if stalled {
                        tracing::warn!("capture ends with a truncated frame");
                        self.summary.parse_errors += 1;
                        break;
                    }
                    stalled = true;
                    reader
                        .refill()
                        .map_err(|e| ConvertError::Capture(format!("refill failed: {e:?}")))?;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "pcap parse error, stopping");
                    self.summary.parse_errors += 1;
                    break;
                }
            }
        }
        Ok(())
    }

    fn read_pcapng<F>(&mut self, file: File, on_packet: &mut F) -> Result<()>
    where
        F: FnMut(&ParsedPacket<'_>),
    {
        let mut reader = PcapNGReader::new(BUFFER_SIZE, file)
            .map_err(|e| ConvertError::Capture(format!("failed to create pcapng reader: {e:?}")))?;
        let mut stalled = false;
        let mut last_ts: DateTime<Utc> = DateTime::default();

        loop {
            match reader.next() {
                Ok((consumed, block)) => {
                    stalled = false;
                    match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                            // interface ids restart with each section
                            self.interfaces.clear();
                        }
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            let mut tsresol: u64 = 1_000_000;
                            for opt in &idb.options {
                                if opt.code == OptionCode::IfTsresol {
                                    if let Some(&val) = opt.value.first() {
                                        tsresol = if val & 0x80 != 0 {
                                            2u64.saturating_pow((val & 0x7f) as u32)
                                        } else {
                                            10u64.saturating_pow(val as u32)
                                        };
                                    }
                                }
                            }
                            self.interfaces.push(Interface {
                                linktype: idb.linktype,
                                tsresol: tsresol.max(1),
                            });
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            let tsresol = self
                                .interfaces
                                .get(epb.if_id as usize)
                                .map(|i| i.tsresol)
                                .unwrap_or(1_000_000);
                            let ts_raw = ((epb.ts_high as u64) << 32) | (epb.ts_low as u64);
                            let secs = (ts_raw / tsresol) as i64;
                            let nanos = ((ts_raw % tsresol) as u128 * 1_000_000_000 / tsresol as u128) as u32;
                            let ts = pcap_ts_to_datetime(secs, nanos);
                            last_ts = ts;
                            // block data carries up to 3 bytes of padding
                            self.frame(epb.if_id as usize, epb.packet_data(), ts, epb.origlen, on_packet);
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            // no timestamp of its own; reuse the latest one
                            self.frame(0, spb.packet_data(), last_ts, spb.origlen, on_packet);
                        }
                        _ => {}
                    }
                    reader.consume(consumed);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    if stalled {
                        tracing::warn!("capture ends with a truncated block");
                        self.summary.parse_errors += 1;
                        break;
                    }
                    stalled = true;
                    reader
                        .refill()
                        .map_err(|e| ConvertError::Capture(format!("refill failed: {e:?}")))?;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "pcapng parse error, stopping");
                    self.summary.parse_errors += 1;
                    break;
                }
            }
        }
        Ok(())
    }

    fn frame<F>(&mut self, if_id: usize, data: &[u8], ts: DateTime<Utc>, origlen: u32, on_packet: &mut F)
    where
        F: FnMut(&ParsedPacket<'_>),
    {
        let index = self.summary.total_frames;
        self.summary.total_frames += 1;

        let linktype = self
            .interfaces
            .get(if_id)
            .map(|i| i.linktype)
            .unwrap_or(Linktype::ETHERNET);

        match parse_link_layer(linktype, data) {
            Some((key, tcp_flags, payload)) => {
                self.summary.decoded += 1;
                self.summary.update_timestamps(ts);
                on_packet(&ParsedPacket {
                    index,
                    timestamp: ts,
                    wire_len: origlen,
                    key,
                    tcp_flags,
                    payload,
                });
            }
            None => self.summary.parse_errors += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Link, network and transport decoding
// ---------------------------------------------------------------------------

type Decoded<'a> = (FlowKey, Option<TcpFlags>, &'a [u8]);

fn parse_link_layer(linktype: Linktype, data: &[u8]) -> Option<Decoded<'_>> {
    match linktype {
        Linktype::ETHERNET => parse_ethernet(data),
        // Raw IP (no link-layer header); 12 is the BSD value of LINKTYPE_RAW,
        // 228/229 the IPv4/IPv6-only variants
        Linktype::RAW | Linktype(12) | Linktype(228) | Linktype(229) => parse_ip_packet(data),
        // BSD loopback (NULL, and LOOP = 108): 4-byte family header
        Linktype::NULL | Linktype(108) => parse_ip_packet(data.get(4..)?),
        Linktype::LINUX_SLL => {
            let ethertype = u16::from_be_bytes([*data.get(14)?, *data.get(15)?]);
            match ethertype {
                0x0800 | 0x86DD => parse_ip_packet(data.get(16..)?),
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_ethernet(data: &[u8]) -> Option<Decoded<'_>> {
    if data.len() < 14 {
        return None;
    }

    let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
    let mut offset = 14usize;

    // 802.1Q and QinQ tags
    while ethertype == 0x8100 || ethertype == 0x88A8 {
        ethertype = u16::from_be_bytes([*data.get(offset + 2)?, *data.get(offset + 3)?]);
        offset += 4;
    }

    if ethertype != 0x0800 && ethertype != 0x86DD {
        return None;
    }

    parse_ip_packet(&data[offset..])
}

fn parse_ip_packet(data: &[u8]) -> Option<Decoded<'_>> {
    use etherparse::{NetHeaders, PacketHeaders, TransportHeader};

    let headers = PacketHeaders::from_ip_slice(data).ok()?;

    let (src_ip, dst_ip, ip_proto) = match headers.net {
        Some(NetHeaders::Ipv4(ref h, _)) => (
            IpAddr::V4(Ipv4Addr::from(h.source)),
            IpAddr::V4(Ipv4Addr::from(h.destination)),
            h.protocol.0,
        ),
        Some(NetHeaders::Ipv6(ref h, _)) => (
            IpAddr::V6(Ipv6Addr::from(h.source)),
            IpAddr::V6(Ipv6Addr::from(h.destination)),
            h.next_header.0,
        ),
        None => return None,
    };

    let payload = headers.payload.slice();

    let (protocol, src_port, dst_port, tcp_flags) = match headers.transport {
        Some(TransportHeader::Tcp(ref tcp)) => (
            TransportProtocol::Tcp,
            tcp.source_port,
            tcp.destination_port,
            Some(TcpFlags {
                syn: tcp.syn,
                ack: tcp.ack,
                fin: tcp.fin,
                rst: tcp.rst,
            }),
        ),
        Some(TransportHeader::Udp(ref udp)) => (TransportProtocol::Udp, udp.source_port, udp.destination_port, None),
        Some(TransportHeader::Icmpv4(_)) | Some(TransportHeader::Icmpv6(_)) => (TransportProtocol::Icmp, 0, 0, None),
        None => (TransportProtocol::from_number(ip_proto), 0, 0, None),
    };

    Some((FlowKey::new(src_ip, src_port, dst_ip, dst_port, protocol), tcp_flags, payload))
}

fn pcap_ts_to_datetime(secs: i64, nanos: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, nanos.min(999_999_999)).unwrap_or_default()
}
