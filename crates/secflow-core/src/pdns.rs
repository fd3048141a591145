//! Passive DNS: IP to hostname mappings observed in traffic.
//!
//! The repository is a JSON object keyed by address, each value listing the
//! hostnames seen for it, oldest first. Runs only ever append to it. There is
//! no locking: two conversions persisting to the same repository at once can
//! lose each other's updates.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::formats::connlog::ZeekLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Seen in the input of the current run
    Observed,
    /// Loaded from the persisted repository
    Repository,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveDnsEntry {
    /// Oldest first; the last name is the preferred one.
    pub hostnames: Vec<String>,
    pub provenance: Provenance,
}

impl PassiveDnsEntry {
    pub fn latest(&self) -> Option<&str> {
        self.hostnames.last().map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct PassiveDnsStore {
    path: Option<PathBuf>,
    repository: HashMap<IpAddr, Vec<String>>,
    observed: HashMap<IpAddr, Vec<String>>,
}

impl PassiveDnsStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read the repository at `path`. A missing file starts an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        if !path.exists() {
            tracing::info!(path = %path.display(), "no passive DNS repository yet, starting empty");
            return Ok(store);
        }

        let content = fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        if content.trim().is_empty() {
            return Ok(store);
        }

        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&content).map_err(|e| ConvertError::Repository {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        for (addr, names) in raw {
            let Ok(ip) = addr.parse::<IpAddr>() else {
                tracing::warn!(entry = %addr, "skipping malformed passive DNS key");
                continue;
            };
            let list = store.repository.entry(ip).or_default();
            for name in names.iter().filter_map(|n| normalize(n)) {
                push_latest(list, name);
            }
        }

        tracing::info!(
            path = %path.display(),
            entries = store.repository.len(),
            "loaded passive DNS repository"
        );
        Ok(store)
    }

    /// Record that `ip` was seen answering for `hostname`. Later calls win.
    pub fn record_observation(&mut self, ip: IpAddr, hostname: &str) {
        let Some(name) = normalize(hostname) else {
            return;
        };
        let list = self.observed.entry(ip).or_default();
        push_latest(list, name);
    }

    pub fn resolve(&self, ip: IpAddr) -> Option<&str> {
        self.observed
            .get(&ip)
            .or_else(|| self.repository.get(&ip))
            .and_then(|names| names.last())
            .map(String::as_str)
    }

    pub fn entry(&self, ip: IpAddr) -> Option<PassiveDnsEntry> {
        if let Some(names) = self.observed.get(&ip) {
            return Some(PassiveDnsEntry {
                hostnames: names.clone(),
                provenance: Provenance::Observed,
            });
        }
        self.repository.get(&ip).map(|names| PassiveDnsEntry {
            hostnames: names.clone(),
            provenance: Provenance::Repository,
        })
    }

    /// Fold this run's observations into the repository and write it back.
    pub fn merge_and_persist(&mut self) -> Result<usize> {
        let merged = self.merge();
        let Some(path) = self.path.clone() else {
            return Ok(merged);
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
        }

        let sorted: BTreeMap<String, &Vec<String>> = self
            .repository
            .iter()
            .map(|(ip, names)| (ip.to_string(), names))
            .collect();
        let json = serde_json::to_string_pretty(&sorted)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| ConvertError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| ConvertError::io(&path, e))?;

        tracing::info!(
            path = %path.display(),
            merged,
            entries = self.repository.len(),
            "updated passive DNS repository"
        );
        Ok(merged)
    }

    fn merge(&mut self) -> usize {
        let mut merged = 0;
        for (ip, names) in &self.observed {
            let list = self.repository.entry(*ip).or_default();
            for name in names {
                if list.last() != Some(name) {
                    merged += 1;
                }
                push_latest(list, name.clone());
            }
        }
        merged
    }

    /// Seed the store from a Zeek `dns.log`. Every answer that is an address
    /// maps back to the queried name.
    pub fn ingest_zeek_dns_log(&mut self, path: &Path) -> Result<usize> {
        let file = fs::File::open(path).map_err(|e| ConvertError::io(path, e))?;
        let mut log = ZeekLog::default();
        let mut recorded = 0;

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ConvertError::io(path, e))?;
            if log.consume_header(&line) {
                continue;
            }
            let Some(query) = log.field(&line, "query") else {
                continue;
            };
            let query = query.to_string();
            let Some(answers) = log.field(&line, "answers") else {
                continue;
            };
            for answer in answers.split(log.set_separator()) {
                if let Ok(ip) = answer.trim().parse::<IpAddr>() {
                    self.record_observation(ip, &query);
                    recorded += 1;
                }
            }
        }

        tracing::info!(path = %path.display(), recorded, "ingested Zeek DNS log");
        Ok(recorded)
    }

    /// Every known address in order, with its effective entry.
    pub fn iter(&self) -> impl Iterator<Item = (IpAddr, PassiveDnsEntry)> + '_ {
        let addrs: BTreeSet<IpAddr> = self.repository.keys().chain(self.observed.keys()).copied().collect();
        addrs
            .into_iter()
            .filter_map(move |ip| self.entry(ip).map(|entry| (ip, entry)))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Distinct addresses known from either source.
    pub fn len(&self) -> usize {
        self.repository.len()
            + self
                .observed
                .keys()
                .filter(|ip| !self.repository.contains_key(ip))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observed_len(&self) -> usize {
        self.observed.len()
    }
}

fn normalize(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() || name == "-" {
        None
    } else {
        Some(name)
    }
}

fn push_latest(list: &mut Vec<String>, name: String) {
    list.retain(|n| n != &name);
    list.push(name);
}
