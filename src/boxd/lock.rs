use crate::boxd::paths::BoxdPaths;
use crate::boxd::util::now_epoch_secs;
use crate::error::BoxdErrorCode;
use anyhow::{Context, Result, bail};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "sync.lock";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: u32,
    pub build_uuid: String,
    pub start_time: u64,
}

pub fn lock_path(paths: &BoxdPaths) -> PathBuf {
    paths.state_dir.join(LOCK_FILE)
}

/// Exclusive hold on the vault for one sync. Released on drop.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    pub fn acquire(paths: &BoxdPaths) -> Result<Self> {
        let path = lock_path(paths);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            let holder = read_holder_from(&mut file)
                .map(|h| format!("pid {}", h.pid))
                .unwrap_or_else(|| "another process".to_string());
            bail!(
                "{}: sync already running ({holder} holds {})",
                BoxdErrorCode::E001Locked.as_str(),
                path.display()
            );
        }

        let holder = LockHolder {
            pid: std::process::id(),
            build_uuid: env!("BUILD_UUID").to_string(),
            start_time: now_epoch_secs()?,
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serde_json::to_string(&holder)?.as_bytes())?;
        file.sync_all()?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_holder_from(file: &mut File) -> Option<LockHolder> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    serde_json::from_str(raw.trim()).ok()
}

/// Current holder as recorded in the lock file. `Ok(None)` when no sync
/// has the lock (missing or emptied file).
pub fn read_holder(paths: &BoxdPaths) -> Result<Option<LockHolder>> {
    let path = lock_path(paths);
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let holder = serde_json::from_str(raw.trim())
        .with_context(|| format!("lock file {} is corrupt", path.display()))?;
    Ok(Some(holder))
}
