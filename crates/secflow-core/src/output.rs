//! Output finalization: intermediate file, sample identity, content hash,
//! sanity check, then promotion of the artifact. All or nothing.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::context::ConversionContext;
use crate::error::{ConvertError, Result};
use crate::models::{SampleMetadata, SecflowOutput};
use crate::schema::{missing_fields, REQUIRED_METADATA_FIELDS, REQUIRED_SECFLOW_FIELDS};

/// A promoted Secflow file.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub sample_id: Uuid,
    pub hash: String,
    pub secflow_count: usize,
}

/// SHA-256 over the identifier bytes followed by the serialized Secflows.
pub fn sample_hash(sample_id: &Uuid, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sample_id.as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

pub fn finalize(ctx: &ConversionContext) -> Result<Artifact> {
    let secflows = ctx.sorted_secflows();

    let intermediate = ctx.intermediate_path();
    let serialized = serde_json::to_vec_pretty(&secflows)?;
    fs::write(&intermediate, &serialized).map_err(|e| ConvertError::io(&intermediate, e))?;
    tracing::debug!(path = %intermediate.display(), bytes = serialized.len(), "wrote intermediate Secflows");

    let sample_id = Uuid::new_v4();
    let content = fs::read(&intermediate).map_err(|e| ConvertError::io(&intermediate, e))?;
    let hash = sample_hash(&sample_id, &content);

    let traffic_start = secflows.iter().map(|f| f.start_time).min();
    let traffic_end = secflows.iter().map(|f| f.end_time).max();
    let output = SecflowOutput {
        metadata: SampleMetadata {
            file_name: ctx.file_name(),
            sample_type: ctx.sample_type,
            sample_id,
            hash: hash.clone(),
            converter_version: crate::VERSION.to_string(),
            generated_at: Utc::now(),
            traffic_start,
            traffic_end,
            secflow_count: secflows.len(),
        },
        secflows,
    };

    check_output_sanity(&output, &intermediate)?;

    let path = ctx.output_path();
    let json = serde_json::to_string_pretty(&output)?;
    fs::write(&path, json).map_err(|e| ConvertError::io(&path, e))?;
    fs::remove_file(&intermediate).map_err(|e| ConvertError::io(&intermediate, e))?;

    tracing::info!(
        path = %path.display(),
        sample_id = %sample_id,
        secflows = output.metadata.secflow_count,
        "wrote Secflow artifact"
    );

    Ok(Artifact {
        path,
        sample_id,
        hash,
        secflow_count: output.metadata.secflow_count,
    })
}

/// Structural check of an assembled output against its intermediate file.
pub fn check_output_sanity(output: &SecflowOutput, intermediate: &Path) -> Result<()> {
    let value = serde_json::to_value(output)?;

    let missing = missing_fields(&value["metadata"], &REQUIRED_METADATA_FIELDS);
    if !missing.is_empty() {
        return Err(ConvertError::Sanity(format!("metadata lacks {}", missing.join(", "))));
    }

    let flows = value["secflows"].as_array().map(Vec::as_slice).unwrap_or_default();
    if flows.is_empty() {
        return Err(ConvertError::Sanity("no Secflows".to_string()));
    }
    for (i, flow) in flows.iter().enumerate() {
        let missing = missing_fields(flow, &REQUIRED_SECFLOW_FIELDS);
        if !missing.is_empty() {
            return Err(ConvertError::Sanity(format!("Secflow {i} lacks {}", missing.join(", "))));
        }
    }

    if output.metadata.secflow_count != flows.len() {
        return Err(ConvertError::Sanity(format!(
            "metadata counts {} Secflows, output holds {}",
            output.metadata.secflow_count,
            flows.len()
        )));
    }

    let content = fs::read(intermediate).map_err(|e| ConvertError::io(intermediate, e))?;
    let stored: Vec<Value> = serde_json::from_slice(&content)
        .map_err(|e| ConvertError::Sanity(format!("intermediate file unreadable: {e}")))?;
    if stored.len() != flows.len() {
        return Err(ConvertError::Sanity(format!(
            "intermediate file holds {} Secflows, output holds {}",
            stored.len(),
            flows.len()
        )));
    }

    if sample_hash(&output.metadata.sample_id, &content) != output.metadata.hash {
        return Err(ConvertError::Sanity("hash does not match intermediate content".to_string()));
    }

    Ok(())
}

/// Move `path` into `dir`, returning the new location.
pub fn relocate(path: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| ConvertError::io(dir, e))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| ConvertError::Sanity(format!("{} has no file name", path.display())))?;
    let dest = dir.join(file_name);
    if dest == path {
        return Ok(dest);
    }

    if fs::rename(path, &dest).is_err() {
        // rename fails across filesystems
        fs::copy(path, &dest).map_err(|e| ConvertError::io(&dest, e))?;
        fs::remove_file(path).map_err(|e| ConvertError::io(path, e))?;
    }
    tracing::debug!(from = %path.display(), to = %dest.display(), "relocated artifact");
    Ok(dest)
}

/// Remove whatever a run left behind when nothing was converted.
pub fn cleanup(ctx: &ConversionContext) -> Result<()> {
    let intermediate = ctx.intermediate_path();
    if intermediate.exists() {
        fs::remove_file(&intermediate).map_err(|e| ConvertError::io(&intermediate, e))?;
    }
    Ok(())
}
