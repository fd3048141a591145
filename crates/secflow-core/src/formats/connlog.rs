//! Zeek TSV logs: `conn.log` rows become Secflows, `dns.log` feeds passive DNS.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use super::FormatParser;
use crate::context::ConversionContext;
use crate::error::{ConvertError, Result};
use crate::models::{FlowKey, FlowObservation, SampleType, TransportProtocol};
use crate::pdns::PassiveDnsStore;

const REQUIRED_CONN_FIELDS: [&str; 6] = ["ts", "id.orig_h", "id.orig_p", "id.resp_h", "id.resp_p", "proto"];

/// Header state of a Zeek ASCII log. Feed every line to `consume_header`
/// first; lines it rejects are data rows.
#[derive(Debug, Clone)]
pub struct ZeekLog {
    separator: String,
    set_separator: String,
    unset_field: String,
    empty_field: String,
    fields: Vec<String>,
    index: HashMap<String, usize>,
    saw_separator: bool,
}

impl Default for ZeekLog {
    fn default() -> Self {
        Self {
            separator: "\t".to_string(),
            set_separator: ",".to_string(),
            unset_field: "-".to_string(),
            empty_field: "(empty)".to_string(),
            fields: Vec::new(),
            index: HashMap::new(),
            saw_separator: false,
        }
    }
}

impl ZeekLog {
    /// Returns true if `line` is a header or comment and has been consumed.
    pub fn consume_header(&mut self, line: &str) -> bool {
        if !line.starts_with('#') {
            return line.trim().is_empty();
        }

        // "#separator \x09" uses a space before the value; the rest use the separator
        if let Some(value) = line.strip_prefix("#separator") {
            self.separator = unescape(value.trim_start_matches([' ', '\t']));
            self.saw_separator = true;
            return true;
        }

        let mut parts = line.splitn(2, self.separator.as_str());
        let directive = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        match directive {
            "#set_separator" => self.set_separator = unescape(value),
            "#unset_field" => self.unset_field = value.to_string(),
            "#empty_field" => self.empty_field = value.to_string(),
            "#fields" => {
                self.fields = value.split(self.separator.as_str()).map(str::to_string).collect();
                self.index = self
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), i))
                    .collect();
            }
            _ => {}
        }
        true
    }

    pub fn has_fields(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.index.contains_key(*n))
    }

    pub fn saw_separator(&self) -> bool {
        self.saw_separator
    }

    pub fn set_separator(&self) -> &str {
        &self.set_separator
    }

    /// Column `name` of a data row. Unset and empty values read as `None`.
    pub fn field<'a>(&self, line: &'a str, name: &str) -> Option<&'a str> {
        let idx = *self.index.get(name)?;
        let value = line.split(self.separator.as_str()).nth(idx)?;
        if value == self.unset_field || value == self.empty_field || value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn number<T: std::str::FromStr + Default>(&self, line: &str, name: &str) -> T {
        self.field(line, name)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

/// Decode `\xHH` escapes as written in Zeek headers.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find("\\x") {
        out.push_str(&rest[..pos]);
        let hex = rest.get(pos + 2..pos + 4);
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(byte) => {
                out.push(byte as char);
                rest = &rest[pos + 4..];
            }
            None => {
                out.push_str("\\x");
                rest = &rest[pos + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn epoch_seconds(value: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
}

pub struct ConnLogParser;

impl FormatParser for ConnLogParser {
    fn sample_type(&self) -> SampleType {
        SampleType::Zeek
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
        let mut log = ZeekLog::default();

        for line in BufReader::new(file).lines() {
            let Ok(line) = line else {
                return Err(ConvertError::format(path, SampleType::Zeek, "not a text log"));
            };
            if !log.consume_header(&line) {
                break;
            }
        }

        if !log.saw_separator() {
            return Err(ConvertError::format(path, SampleType::Zeek, "missing #separator header"));
        }
        if !log.has_fields(&REQUIRED_CONN_FIELDS) {
            return Err(ConvertError::format(
                path,
                SampleType::Zeek,
                "#fields lacks the connection tuple columns",
            ));
        }
        Ok(())
    }

    fn parse(&self, ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool> {
        match ctx.dns_log_path.clone() {
            Some(dns_log) => {
                dns.ingest_zeek_dns_log(&dns_log)?;
            }
            None => tracing::info!("no DNS log supplied, destinations keep their raw addresses"),
        }

        let path = ctx.original_path.clone();
        let file = File::open(&path).map_err(|e| ConvertError::io(&path, e))?;
        let mut log = ZeekLog::default();
        let mut rows = 0u64;

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ConvertError::io(&path, e))?;
            if log.consume_header(&line) {
                continue;
            }
            rows += 1;

            match observation(&log, &line) {
                Some(obs) => {
                    ctx.observe(&obs);
                }
                None => {
                    tracing::warn!(line = lineno + 1, "skipping malformed conn.log row");
                    ctx.skip();
                }
            }
        }

        ctx.finalize_durations();
        tracing::info!(
            file = %ctx.file_name(),
            rows,
            secflows = ctx.secflow_count(),
            dropped_local = ctx.stats.dropped_local,
            "converted connection log"
        );
        Ok(ctx.secflow_count() > 0)
    }
}

fn observation(log: &ZeekLog, line: &str) -> Option<FlowObservation> {
    let src: IpAddr = log.field(line, "id.orig_h")?.parse().ok()?;
    let dst: IpAddr = log.field(line, "id.resp_h")?.parse().ok()?;
    let protocol = TransportProtocol::from_name(log.field(line, "proto")?)?;
    let start = epoch_seconds(log.field(line, "ts")?)?;

    let key = FlowKey::new(
        src,
        log.number(line, "id.orig_p"),
        dst,
        log.number(line, "id.resp_p"),
        protocol,
    );

    let duration: f64 = log.number(line, "duration");
    let end = start
        .checked_add_signed(Duration::microseconds((duration.max(0.0) * 1e6).round() as i64))
        .unwrap_or(start);

    let mut obs = FlowObservation::new(key, start)
        .with_end(end)
        .with_counters(
            log.number(line, "orig_bytes"),
            log.number(line, "resp_bytes"),
            log.number(line, "orig_pkts"),
            log.number(line, "resp_pkts"),
        );
    if let Some(uid) = log.field(line, "uid") {
        obs = obs.with_session(uid);
    }
    Some(obs)
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::config::ConverterConfig;
    use crate::models::Direction;
    use std::fs;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\x09"), "\t");
        assert_eq!(unescape("a\\x2cb"), "a,b");
        assert_eq!(unescape("\\xZZ"), "\\xZZ");
        assert_eq!(unescape(","), ",");
    }

    #[test]
    fn test_header_and_fields() {
        let mut log = ZeekLog::default();
        for line in CONN_HEADER.lines() {
            assert!(log.consume_header(line));
        }
        assert!(log.saw_separator());
        assert!(log.has_fields(&REQUIRED_CONN_FIELDS));

        let row = "1.5\tCx1\t10.0.0.1\t5\t8.8.8.8\t53\tudp\tdns\t-\t(empty)\t20\tSF\t1\t1";
        assert!(!log.consume_header(row));
        assert_eq!(log.field(row, "uid"), Some("Cx1"));
        assert_eq!(log.field(row, "duration"), None);
        assert_eq!(log.field(row, "orig_bytes"), None);
        assert_eq!(log.number::<u64>(row, "resp_bytes"), 20);
        assert_eq!(log.number::<u64>(row, "missing_column"), 0);
    }

    #[test]
    fn test_validate_rejects_other_logs() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("conn.log");
        fs::write(&good, conn_log(&[])).unwrap();
        assert!(ConnLogParser.validate(&good).is_ok());

        let no_sep = dir.path().join("nosep.log");
        fs::write(&no_sep, "#fields\tts\tid.orig_h\n").unwrap();
        assert!(ConnLogParser.validate(&no_sep).unwrap_err().is_format_error());

        let dns = dir.path().join("dns.log");
        fs::write(&dns, "#separator \\x09\n#fields\tts\tuid\tquery\tanswers\n").unwrap();
        assert!(ConnLogParser.validate(&dns).unwrap_err().is_format_error());

        let binary = dir.path().join("capture.pcap");
        fs::write(&binary, [0xd4, 0xc3, 0xb2, 0xa1, 0xff, 0xfe, 0x00, 0x80]).unwrap();
        assert!(ConnLogParser.validate(&binary).unwrap_err().is_format_error());
    }

    #[test]
    fn test_rows_map_to_secflows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conn.log");
        fs::write(
            &path,
            conn_log(&[
                "1700000000.000000\tCa1\t10.0.0.1\t50000\t10.0.0.2\t445\ttcp\t-\t1.0\t10\t10\tSF\t1\t1",
                "1700000000.250000\tCa2\t10.0.0.1\t50001\t93.184.216.34\t443\ttcp\tssl\t2.0\t1000\t4000\tSF\t6\t5",
                "1700000001.000000\tCa3\tnot-an-ip\t1\t8.8.8.8\t53\tudp\tdns\t-\t-\t-\tS0\t-\t-",
                "1700000002.000000\tCa4\t10.0.0.1\t50002\t8.8.8.8\t53\tudp\tdns\t-\t-\t-\tS0\t-\t-",
            ]),
        )
        .unwrap();

        let mut ctx = ConversionContext::new(&path, SampleType::Zeek, &ConverterConfig::default()).unwrap();
        let mut dns = PassiveDnsStore::in_memory();
        assert!(ConnLogParser.parse(&mut ctx, &mut dns).unwrap());

        assert_eq!(ctx.secflow_count(), 2);
        assert_eq!(ctx.stats.dropped_local, 1);
        assert_eq!(ctx.stats.skipped, 1);

        let flows = ctx.sorted_secflows();
        let https = &flows[0];
        assert_eq!(https.session.as_deref(), Some("Ca2"));
        assert_eq!(https.source_bytes, 1000);
        assert_eq!(https.dest_bytes, 4000);
        assert_eq!((https.source_packets, https.dest_packets), (6, 5));
        assert_eq!(https.duration, 2.0);
        assert_eq!(https.direction, Direction::Outbound);

        let unanswered = &flows[1];
        assert_eq!(unanswered.total_bytes(), 0);
        assert_eq!(unanswered.duration, 0.0);
    }

    #[test]
    fn test_sidecar_dns_log_is_ingested() {
        let dir = tempfile::tempdir().unwrap();
        let conn = dir.path().join("conn.log");
        fs::write(
            &conn,
            conn_log(&["1700000000.0\tCb1\t10.0.0.1\t50000\t93.184.216.34\t80\ttcp\thttp\t0.5\t100\t200\tSF\t2\t2"]),
        )
        .unwrap();
        let dns_log = dir.path().join("dns.log");
        fs::write(
            &dns_log,
            "#separator \\x09\n#set_separator\t,\n#fields\tts\tquery\tanswers\n1700000000.0\texample.com\t93.184.216.34\n",
        )
        .unwrap();

        let mut ctx = ConversionContext::new(&conn, SampleType::Zeek, &ConverterConfig::default())
            .unwrap()
            .with_dns_log(Some(dns_log));
        let mut dns = PassiveDnsStore::in_memory();
        ConnLogParser.parse(&mut ctx, &mut dns).unwrap();
        assert_eq!(dns.resolve("93.184.216.34".parse().unwrap()), Some("example.com"));
    }
}
