use std::path::{Path, PathBuf};

use crate::aggregate::{Fold, FlowAggregator};
use crate::config::ConverterConfig;
use crate::error::Result;
use crate::localnet::LocalNetworks;
use crate::models::*;

/// Per-input conversion state, passed explicitly through every stage.
#[derive(Debug)]
pub struct ConversionContext {
    pub original_path: PathBuf,
    pub sample_type: SampleType,
    pub output_dir: Option<PathBuf>,
    pub work_dir: PathBuf,
    /// Companion name-resolution log (Zeek dns.log)
    pub dns_log_path: Option<PathBuf>,
    pub stats: ConversionStats,
    local: LocalNetworks,
    flows: FlowAggregator,
}

impl ConversionContext {
    pub fn new(original_path: impl Into<PathBuf>, sample_type: SampleType, config: &ConverterConfig) -> Result<Self> {
        let original_path = original_path.into();
        let work_dir = config.work_dir.clone().unwrap_or_else(|| {
            original_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        Ok(Self {
            original_path,
            sample_type,
            output_dir: config.output_dir.clone(),
            work_dir,
            dns_log_path: None,
            stats: ConversionStats::default(),
            local: LocalNetworks::with_extra(&config.extra_local_networks)?,
            flows: FlowAggregator::new(),
        })
    }

    pub fn with_dns_log(mut self, path: Option<PathBuf>) -> Self {
        self.dns_log_path = path;
        self
    }

    /// Hand one observation to the aggregator unless both endpoints are
    /// local. Returns whether it was kept.
    pub fn observe(&mut self, obs: &FlowObservation) -> bool {
        if self.local.is_local_pair(obs.key.src, obs.key.dst) {
            self.stats.dropped_local += 1;
            return false;
        }
        self.stats.observations += 1;
        if self.flows.fold(obs, &self.local) == Fold::Created {
            tracing::trace!(flow = %obs.key, "new secflow");
        }
        true
    }

    pub fn skip(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn finalize_durations(&mut self) {
        self.flows.finalize_durations();
    }

    pub fn secflows(&self) -> &[Secflow] {
        self.flows.secflows()
    }

    pub fn secflows_mut(&mut self) -> &mut [Secflow] {
        self.flows.secflows_mut()
    }

    pub fn sorted_secflows(&self) -> Vec<Secflow> {
        self.flows.sorted()
    }

    pub fn secflow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn file_name(&self) -> String {
        self.original_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn file_stem(&self) -> String {
        self.original_path
            .file_stem()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "sample".to_string())
    }

    /// Serialized Secflows awaiting hashing.
    pub fn intermediate_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.secflows.tmp.json", self.file_stem()))
    }

    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.secflow.json", self.file_stem()))
    }
}
