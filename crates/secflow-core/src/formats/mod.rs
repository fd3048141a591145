//! Input formats. Each parser validates its file before anything is read
//! for conversion, then streams records into the conversion context.

pub mod capture;
pub mod connlog;
pub mod interflow;

use std::path::Path;

use crate::context::ConversionContext;
use crate::error::Result;
use crate::models::SampleType;
use crate::pdns::PassiveDnsStore;

pub use capture::CaptureParser;
pub use connlog::{ConnLogParser, ZeekLog};
pub use interflow::InterflowParser;

pub trait FormatParser {
    fn sample_type(&self) -> SampleType;

    /// Structural check only. Rejects the file with a format error when it
    /// is not of this parser's type.
    fn validate(&self, path: &Path) -> Result<()>;

    /// Fold every record into `ctx`. Returns whether any Secflow exists.
    fn parse(&self, ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool>;
}

pub fn parser_for(sample_type: SampleType) -> &'static dyn FormatParser {
    match sample_type {
        SampleType::Pcap => &CaptureParser,
        SampleType::Zeek => &ConnLogParser,
        SampleType::Interflow => &InterflowParser,
    }
}

pub fn validate_file_format(ctx: &ConversionContext) -> Result<()> {
    parser_for(ctx.sample_type).validate(&ctx.original_path)
}

pub fn capture_to_secflows(ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool> {
    CaptureParser.parse(ctx, dns)
}

/// The DNS sidecar, if any, comes from `ctx.dns_log_path`.
pub fn log_to_secflows(ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool> {
    ConnLogParser.parse(ctx, dns)
}

pub fn interflow_to_secflows(ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool> {
    InterflowParser.parse(ctx, dns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConverterConfig;
    use crate::ingest::testutil::{tcp_frame, write_pcap};
    use std::fs;

    /// One valid sample per format; every other parser must reject it.
    #[test]
    fn test_parsers_reject_foreign_formats() {
        let dir = tempfile::tempdir().unwrap();

        let pcap = dir.path().join("a.pcap");
        write_pcap(&pcap, &[(1, 0, tcp_frame([10, 0, 0, 1], 1, [8, 8, 8, 8], 2, true, false, &[]))]);
        let conn = dir.path().join("conn.log");
        fs::write(&conn, connlog::testutil::conn_log(&[])).unwrap();
        let interflow = dir.path().join("flows.json");
        fs::write(&interflow, r#"[{"srcip":"10.0.0.5","dstip":"8.8.8.8","proto_name":"udp"}]"#).unwrap();

        let samples = [
            (SampleType::Pcap, pcap),
            (SampleType::Zeek, conn),
            (SampleType::Interflow, interflow),
        ];

        for (own, path) in &samples {
            assert!(parser_for(*own).validate(path).is_ok(), "{own} should accept its own sample");
            for other in [SampleType::Pcap, SampleType::Zeek, SampleType::Interflow] {
                if other == *own {
                    continue;
                }
                let err = parser_for(other).validate(path).unwrap_err();
                assert!(err.is_format_error(), "{other} accepted a {own} sample");
            }
        }
    }

    #[test]
    fn test_validate_file_format_uses_context_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows.json");
        fs::write(&path, "{}").unwrap();
        let ctx = ConversionContext::new(&path, SampleType::Interflow, &ConverterConfig::default()).unwrap();
        assert!(validate_file_format(&ctx).unwrap_err().is_format_error());
    }
}
