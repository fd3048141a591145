use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Network primitives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl TransportProtocol {
    /// Map an IP protocol number onto the transport enum.
    pub fn from_number(n: u8) -> Self {
        match n {
            6 => Self::Tcp,
            17 => Self::Udp,
            1 | 58 => Self::Icmp,
            other => Self::Other(other),
        }
    }

    /// Parse the protocol names used by Zeek and Interflow ("tcp", "UDP", "icmp6", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "icmp" | "icmp6" | "icmpv6" | "ipv6-icmp" => Some(Self::Icmp),
            other => other.parse::<u8>().ok().map(Self::from_number),
        }
    }

    pub fn has_ports(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Icmp => write!(f, "ICMP"),
            Self::Other(n) => write!(f, "IP/{n}"),
        }
    }
}

/// Flow identity. Port-less protocols carry port 0 on both sides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct FlowKey {
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
    pub protocol: TransportProtocol,
}

impl FlowKey {
    pub fn new(src: IpAddr, src_port: u16, dst: IpAddr, dst_port: u16, protocol: TransportProtocol) -> Self {
        let (src_port, dst_port) = if protocol.has_ports() {
            (src_port, dst_port)
        } else {
            (0, 0)
        };
        Self { src, src_port, dst, dst_port, protocol }
    }

    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            src_port: self.dst_port,
            dst: self.src,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol, self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

// ---------------------------------------------------------------------------
// Flow observations: one packet, log line or JSON record
// ---------------------------------------------------------------------------

/// Role of the sender of an observation, when the input reveals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    Client,
    Server,
}

#[derive(Debug, Clone)]
pub struct FlowObservation {
    pub key: FlowKey,
    pub timestamp: DateTime<Utc>,
    /// Set by records that already summarize a time window.
    pub end: Option<DateTime<Utc>>,
    pub src_bytes: u64,
    pub dst_bytes: u64,
    pub src_packets: u64,
    pub dst_packets: u64,
    /// Distinguishes records that must never merge (Zeek connection uid).
    pub session: Option<String>,
    pub hint: Option<SenderRole>,
}

impl FlowObservation {
    pub fn new(key: FlowKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            key,
            timestamp,
            end: None,
            src_bytes: 0,
            dst_bytes: 0,
            src_packets: 0,
            dst_packets: 0,
            session: None,
            hint: None,
        }
    }

    /// A single frame sent by `key.src`.
    pub fn packet(key: FlowKey, timestamp: DateTime<Utc>, wire_len: u64) -> Self {
        Self {
            src_bytes: wire_len,
            src_packets: 1,
            ..Self::new(key, timestamp)
        }
    }

    pub fn with_counters(mut self, src_bytes: u64, dst_bytes: u64, src_packets: u64, dst_packets: u64) -> Self {
        self.src_bytes = src_bytes;
        self.dst_bytes = dst_bytes;
        self.src_packets = src_packets;
        self.dst_packets = dst_packets;
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_hint(mut self, hint: SenderRole) -> Self {
        self.hint = Some(hint);
        self
    }

    /// The same evidence seen from the other endpoint.
    pub(crate) fn flipped(&self) -> Self {
        Self {
            key: self.key.reversed(),
            src_bytes: self.dst_bytes,
            dst_bytes: self.src_bytes,
            src_packets: self.dst_packets,
            dst_packets: self.src_packets,
            hint: self.hint.map(|h| match h {
                SenderRole::Client => SenderRole::Server,
                SenderRole::Server => SenderRole::Client,
            }),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Secflow: the canonical output unit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local source talking to an external destination
    Outbound,
    /// External source talking to a local destination
    Inbound,
    /// Neither endpoint is local
    External,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    #[default]
    Address,
    PassiveDns,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Secflow {
    #[serde(flatten)]
    pub key: FlowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub name: String,
    #[serde(default)]
    pub name_source: NameSource,
    pub direction: Direction,
    pub start_time: DateTime<Utc>,
    #[serde(skip)]
    pub end_time: DateTime<Utc>,
    /// Seconds; provisional until the aggregator's finalize pass.
    pub duration: f64,
    pub source_bytes: u64,
    pub dest_bytes: u64,
    pub source_packets: u64,
    pub dest_packets: u64,
}

impl Secflow {
    pub(crate) fn open(key: FlowKey, session: Option<String>, direction: Direction, start: DateTime<Utc>) -> Self {
        Self {
            key,
            session,
            name: key.dst.to_string(),
            name_source: NameSource::Address,
            direction,
            start_time: start,
            end_time: start,
            duration: 0.0,
            source_bytes: 0,
            dest_bytes: 0,
            source_packets: 0,
            dest_packets: 0,
        }
    }

    pub fn total_packets(&self) -> u64 {
        self.source_packets.saturating_add(self.dest_packets)
    }

    pub fn total_bytes(&self) -> u64 {
        self.source_bytes.saturating_add(self.dest_bytes)
    }
}

// ---------------------------------------------------------------------------
// Sample metadata and the final artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Pcap,
    Zeek,
    Interflow,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcap => write!(f, "PCAP"),
            Self::Zeek => write!(f, "Zeek"),
            Self::Interflow => write!(f, "Interflow"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetadata {
    pub file_name: String,
    pub sample_type: SampleType,
    pub sample_id: Uuid,
    pub hash: String,
    pub converter_version: String,
    pub generated_at: DateTime<Utc>,
    pub traffic_start: Option<DateTime<Utc>>,
    pub traffic_end: Option<DateTime<Utc>>,
    pub secflow_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecflowOutput {
    pub metadata: SampleMetadata,
    pub secflows: Vec<Secflow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    /// Observations handed to the aggregator
    pub observations: u64,
    /// Observations dropped because both endpoints were local
    pub dropped_local: u64,
    /// Frames or records that could not be decoded
    pub skipped: u64,
}
