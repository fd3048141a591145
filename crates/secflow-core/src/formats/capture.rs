//! pcap/pcapng captures: every decoded frame is one flow observation.

use std::path::Path;

use super::FormatParser;
use crate::context::ConversionContext;
use crate::error::{ConvertError, Result};
use crate::ingest::{self, ParsedPacket, PcapIngestor};
use crate::models::{FlowObservation, SampleType, SenderRole};
use crate::pdns::PassiveDnsStore;
use crate::protocols;

pub struct CaptureParser;

impl FormatParser for CaptureParser {
    fn sample_type(&self) -> SampleType {
        SampleType::Pcap
    }

    fn validate(&self, path: &Path) -> Result<()> {
        match ingest::sniff_format(path)? {
            Some(_) => Ok(()),
            None => Err(ConvertError::format(path, SampleType::Pcap, "no pcap or pcapng magic")),
        }
    }

    fn parse(&self, ctx: &mut ConversionContext, dns: &mut PassiveDnsStore) -> Result<bool> {
        let path = ctx.original_path.clone();
        let mut names = 0usize;

        let summary = PcapIngestor::stream(&path, |pkt| {
            names += record_dns(pkt, dns);
            ctx.observe(&observation(pkt));
        })?;

        for _ in 0..summary.parse_errors {
            ctx.skip();
        }

        // The end of a flow is only known once the whole file has been read.
        ctx.finalize_durations();

        tracing::info!(
            file = %ctx.file_name(),
            frames = summary.total_frames,
            first = ?summary.first_timestamp,
            last = ?summary.last_timestamp,
            secflows = ctx.secflow_count(),
            dropped_local = ctx.stats.dropped_local,
            dns_names = names,
            "converted capture"
        );
        Ok(ctx.secflow_count() > 0)
    }
}

fn observation(pkt: &ParsedPacket<'_>) -> FlowObservation {
    let obs = FlowObservation::packet(pkt.key, pkt.timestamp, pkt.wire_len as u64);
    match pkt.tcp_flags {
        Some(flags) if flags.is_syn_ack() => obs.with_hint(SenderRole::Server),
        Some(flags) if flags.is_syn_only() => obs.with_hint(SenderRole::Client),
        _ => obs,
    }
}

/// Feed answers of an in-band DNS response to the passive DNS store.
fn record_dns(pkt: &ParsedPacket<'_>, store: &mut PassiveDnsStore) -> usize {
    let Some(body) = protocols::dns_payload(pkt.key.protocol, pkt.key.src_port, pkt.key.dst_port, pkt.payload) else {
        return 0;
    };
    let Some(message) = protocols::dns::parse_message(body) else {
        return 0;
    };
    let resolutions = message.resolutions();
    for (ip, name) in &resolutions {
        store.record_observation(*ip, name);
    }
    resolutions.len()
}
