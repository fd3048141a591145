//! The conversion pipeline: validate, parse, name, finalize.

use std::path::{Path, PathBuf};

use crate::config::ConverterConfig;
use crate::context::ConversionContext;
use crate::error::Result;
use crate::formats;
use crate::models::SampleType;
use crate::naming;
use crate::output::{self, Artifact};
use crate::pdns::PassiveDnsStore;

/// Exactly one input kind per run.
#[derive(Debug, Clone)]
pub enum Input {
    Capture(PathBuf),
    ConnLog { conn: PathBuf, dns: Option<PathBuf> },
    Interflow(PathBuf),
}

impl Input {
    pub fn path(&self) -> &Path {
        match self {
            Self::Capture(p) | Self::Interflow(p) => p,
            Self::ConnLog { conn, .. } => conn,
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Self::Capture(_) => SampleType::Pcap,
            Self::ConnLog { .. } => SampleType::Zeek,
            Self::Interflow(_) => SampleType::Interflow,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Converted(Artifact),
    /// Parsing succeeded but every record was filtered or unusable
    NoTraffic,
}

pub fn convert(input: &Input, config: &ConverterConfig) -> Result<Outcome> {
    let dns_log = match input {
        Input::ConnLog { dns, .. } => dns.clone(),
        _ => None,
    };
    let mut ctx = ConversionContext::new(input.path(), input.sample_type(), config)?.with_dns_log(dns_log);

    formats::validate_file_format(&ctx)?;
    tracing::info!(file = %ctx.file_name(), sample_type = %ctx.sample_type, "input validated");

    let mut dns = PassiveDnsStore::load(&config.pdns_repository)?;

    let produced = match ctx.sample_type {
        SampleType::Pcap => formats::capture_to_secflows(&mut ctx, &mut dns)?,
        SampleType::Zeek => formats::log_to_secflows(&mut ctx, &mut dns)?,
        SampleType::Interflow => formats::interflow_to_secflows(&mut ctx, &mut dns)?,
    };

    if !produced {
        tracing::info!(
            file = %ctx.file_name(),
            dropped_local = ctx.stats.dropped_local,
            skipped = ctx.stats.skipped,
            "no traffic converted"
        );
        output::cleanup(&ctx)?;
        return Ok(Outcome::NoTraffic);
    }

    finish(&mut dns, &mut ctx, config).map(Outcome::Converted)
}

/// Persist passive DNS, name destinations, finalize and relocate.
pub fn finish(dns: &mut PassiveDnsStore, ctx: &mut ConversionContext, config: &ConverterConfig) -> Result<Artifact> {
    if config.update_passive_dns {
        dns.merge_and_persist()?;
    }

    naming::name_destinations(ctx.secflows_mut(), dns);

    let mut artifact = output::finalize(ctx)?;
    if let Some(dir) = &ctx.output_dir {
        artifact.path = output::relocate(&artifact.path, dir)?;
    }
    Ok(artifact)
}
