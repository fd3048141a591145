// Converter configuration: loaded from TOML, overridden by command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Persisted passive DNS repository
    pub pdns_repository: PathBuf,
    /// Where intermediate and output files are written before relocation.
    /// Defaults to the input file's directory.
    pub work_dir: Option<PathBuf>,
    /// Final destination of the Secflow artifact
    pub output_dir: Option<PathBuf>,
    /// Extra CIDRs treated as local in addition to the reserved ranges
    pub extra_local_networks: Vec<String>,
    /// Write newly observed names back to the repository
    pub update_passive_dns: bool,
    pub log_filter: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pdns_repository: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("secflow")
                .join("passive_dns.json"),
            work_dir: None,
            output_dir: None,
            extra_local_networks: Vec::new(),
            update_passive_dns: true,
            log_filter: "secflow=info,secflow_core=info".to_string(),
        }
    }
}

impl ConverterConfig {
    /// Load `path`, or the default location when `path` is `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(ConvertError::Config(format!(
                    "config file {} does not exist",
                    config_path.display()
                )));
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConvertError::io(&config_path, e))?;
        let config: ConverterConfig = toml::from_str(&content)
            .map_err(|e| ConvertError::Config(format!("{}: {e}", config_path.display())))?;

        tracing::debug!(path = %config_path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
        }
        let content = self.to_toml()?;
        fs::write(path, content).map_err(|e| ConvertError::io(path, e))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConvertError::Config(e.to_string()))
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("secflow")
            .join("config.toml")
    }
}
