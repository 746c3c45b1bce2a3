use crate::boxd::paths::BoxdPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoxdState {
    pub schema_version: u32,
    pub last_sync_epoch_secs: u64,
    pub last_item_count: usize,
    /// Vault-relative paths written by the last sync.
    pub last_written: Vec<String>,
    pub diary_sha256: Option<String>,
}

impl Default for BoxdState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            last_sync_epoch_secs: 0,
            last_item_count: 0,
            last_written: Vec::new(),
            diary_sha256: None,
        }
    }
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn state_file_path(paths: &BoxdPaths) -> PathBuf {
    paths.state_dir.join("sync_state.json")
}

pub fn load(paths: &BoxdPaths) -> Result<BoxdState> {
    let file = state_file_path(paths);
    if !file.exists() {
        return Ok(BoxdState::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: BoxdState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &BoxdPaths, state: &BoxdState) -> Result<PathBuf> {
    let file = state_file_path(paths);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}
