//! Interflow JSON records: a JSON array, or one record per line. Records
//! may be wrapped in a search hit (`{"_source": {...}}`).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::FormatParser;
use crate::context::ConversionContext;
use crate::error::{ConvertError, Result};
use crate::models::{FlowKey, FlowObservation, SampleType, TransportProtocol};
use crate::pdns::PassiveDnsStore;

/// Numbers in exported logs arrive as integers, floats or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Lenient {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Lenient {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.is_finite() && *f >= 0.0 => Some(*f as u64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterflowRecord {
    pub srcip: Option<String>,
    pub dstip: Option<String>,
    pub srcport: Option<Lenient>,
    pub dstport: Option<Lenient>,
    pub proto_name: Option<String>,
    pub proto: Option<Lenient>,
    /// Epoch milliseconds, or an RFC 3339 string
    pub timestamp: Option<Lenient>,
    /// Milliseconds
    pub duration: Option<Lenient>,
    pub outbytes_delta: Option<Lenient>,
    pub inbytes_delta: Option<Lenient>,
    pub outpkts_delta: Option<Lenient>,
    pub inpkts_delta: Option<Lenient>,
    pub srcip_host: Option<String>,
    pub dstip_host: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Hit {
        #[serde(rename = "_source")]
        source: InterflowRecord,
    },
    Record(InterflowRecord),
}

impl Entry {
    fn into_record(self) -> InterflowRecord {
        match self {
            Self::Hit { source } => source,
            Self::Record(record) => record,
        }
    }
}

impl InterflowRecord {
    fn has_endpoints(&self) -> bool {
        self.srcip.is_some() && self.dstip.is_some()
    }

    fn protocol(&self) -> Option<TransportProtocol> {
        if let Some(name) = &self.proto_name {
            return TransportProtocol::from_name(name);
        }
        let number = self.proto.as_ref()?.as_u64()?;
        u8::try_from(number).ok().map(TransportProtocol::from_number)
    }

    fn start(&self) -> Option<DateTime<Utc>> {
        match self.timestamp.as_ref()? {
            Lenient::Text(s) if s.contains('T') => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            other => DateTime::from_timestamp_millis(i64::try_from(other.as_u64()?).ok()?),
        }
    }

    fn count(field: &Option<Lenient>) -> u64 {
        field.as_ref().and_then(Lenient::as_u64).unwrap_or(0)
    }

    fn port(field: &Option<Lenient>) -> u16 {
        field
            .as_ref()
            .and_then(Lenient::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(0)
    }

    pub fn observation(&self) -> Option<FlowObservation> {
        let src: IpAddr = self.srcip.as_deref()?.trim().parse().ok()?;
        let dst: IpAddr = self.dstip.as_deref()?.trim().parse().ok()?;
        let protocol = self.protocol()?;
        let start = self.start()?;
        let duration_ms = Self::count(&self.duration);

        let end = i64::try_from(duration_ms)
            .ok()
            .and_then(|ms| start.checked_add_signed(Duration::milliseconds(ms)))
            .unwrap_or(start);

        let key = FlowKey::new(src, Self::port(&self.srcport), dst, Self::port(&self.dstport), protocol);
        Some(
            FlowObservation::new(key, start)
                .with_end(end)
                .with_counters(
                    Self::count(&self.outbytes_delta),
                    Self::count(&self.inbytes_delta),
                    Self::count(&self.outpkts_delta),
                    Self::count(&self.inpkts_delta),
                ),
        )
    }
}

fn first_content_byte(path: &Path) -> Result<Option<u8>> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    for byte in BufReader::new(file).bytes() {
        let byte = byte.map_err(|e| ConvertError::io(path, e))?;
        if !byte.is_ascii_whitespace() {
            return Ok(Some(byte));
        }
    }
    Ok(None)
}

/// Array elements stay raw so one bad element costs one record, as a bad
/// line does in JSON-lines files.
fn read_array(path: &Path) -> Result<Vec<serde_json::Value>> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub struct InterflowParser;

impl FormatParser for InterflowParser {
    fn sample_type(&self) -> SampleType {
        SampleType::Interflow
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let reject = |reason: &str| ConvertError::format(path, SampleType::Interflow, reason);

        let first = match first_content_byte(path)? {
            Some(b'[') => match read_array(path)
                .map_err(|e| reject(&format!("unreadable JSON array: {e}")))?
                .into_iter()
                .next()
            {
                Some(value) => {
                    let entry: Entry = serde_json::from_value(value)
                        .map_err(|e| reject(&format!("first element is not a record: {e}")))?;
                    Some(entry.into_record())
                }
                None => None,
            },
            Some(b'{') => {
                let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
                let mut reader = BufReader::new(file);
                let mut line = Vec::new();
                loop {
                    line.clear();
                    let n = reader.read_until(b'\n', &mut line).map_err(|e| ConvertError::io(path, e))?;
                    if n == 0 || !line.trim_ascii().is_empty() {
                        break;
                    }
                }
                let entry: Entry = serde_json::from_slice(line.trim_ascii())
                    .map_err(|e| reject(&format!("first line is not a JSON record: {e}")))?;
                Some(entry.into_record())
            }
            Some(_) => return Err(reject("not JSON")),
            None => return Err(reject("empty file")),
        };

        match first {
            Some(record) if record.has_endpoints() => Ok(()),
            Some(_) => Err(reject("first record lacks srcip/dstip")),
            None => Err(reject("no records")),
        }
    }

    fn parse(&self, ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool> {
        let path = ctx.original_path.clone();
        let mut records = 0u64;
        let mut untimed = 0u64;

        let mut handle = |record: InterflowRecord, ctx: &mut ConversionContext| {
            records += 1;
            let Some(obs) = record.observation() else {
                if record.has_endpoints() && record.start().is_none() {
                    untimed += 1;
                }
                ctx.skip();
                return;
            };
            if let Some(host) = record.srcip_host.as_deref() {
                dns.record_observation(obs.key.src, host);
            }
            if let Some(host) = record.dstip_host.as_deref() {
                dns.record_observation(obs.key.dst, host);
            }
            ctx.observe(&obs);
        };

        if first_content_byte(&path)? == Some(b'[') {
            for (index, value) in read_array(&path)?.into_iter().enumerate() {
                match serde_json::from_value::<Entry>(value) {
                    Ok(entry) => handle(entry.into_record(), ctx),
                    Err(e) => {
                        tracing::warn!(element = index, error = %e, "skipping malformed Interflow element");
                        ctx.skip();
                    }
                }
            }
        } else {
            let file = File::open(&path).map_err(|e| ConvertError::io(&path, e))?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| ConvertError::io(&path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Entry>(&line) {
                    Ok(entry) => handle(entry.into_record(), ctx),
                    Err(e) => {
                        tracing::warn!(line = lineno + 1, error = %e, "skipping malformed Interflow line");
                        ctx.skip();
                    }
                }
            }
        }

        ctx.finalize_durations();
        if untimed > 0 {
            tracing::warn!(untimed, "dropped Interflow records without a usable timestamp");
        }
        tracing::info!(
            file = %ctx.file_name(),
            records,
            secflows = ctx.secflow_count(),
            skipped = ctx.stats.skipped,
            "converted Interflow log"
        );
        Ok(ctx.secflow_count() > 0)
    }
}
