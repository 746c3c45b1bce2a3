use crate::boxd::document::WriteAction;
use crate::error::SyncError;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Full-text replacement (or creation) of one document, by vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRequest {
    pub path: PathBuf,
    pub action: WriteAction,
    pub text: String,
}

/// Read access to existing documents. `Ok(None)` means the document does not exist.
pub trait DocumentReader {
    fn read(&self, path: &Path) -> Result<Option<String>>;
}

/// Documents stored as files under a vault directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Atomically replace the target file. Returns `false` for `Unchanged`
    /// requests, which are never written.
    pub fn write(&self, request: &WriteRequest) -> Result<bool, SyncError> {
        if request.action == WriteAction::Unchanged {
            return Ok(false);
        }
        let target = self.resolve(&request.path);
        let io_err = |source: std::io::Error| SyncError::Io {
            path: target.clone(),
            source,
        };

        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(&parent).map_err(io_err)?;
        tmp.write_all(request.text.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|err| io_err(err.error))?;
        Ok(true)
    }
}

impl DocumentReader for FsStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        let target = self.resolve(path);
        match fs::read_to_string(&target) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", target.display())),
        }
    }
}

/// Apply requests in order, stopping at the first failure. Requests before
/// the failing one stay applied.
pub fn apply_requests<'a>(
    store: &FsStore,
    requests: impl IntoIterator<Item = &'a WriteRequest>,
) -> Result<Vec<PathBuf>, SyncError> {
    let mut written = Vec::new();
    for request in requests {
        if store.write(request)? {
            written.push(request.path.clone());
        }
    }
    Ok(written)
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub docs: std::collections::BTreeMap<PathBuf, String>,
    pub unreadable: std::collections::BTreeSet<PathBuf>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with(mut self, path: &str, text: &str) -> Self {
        self.docs.insert(PathBuf::from(path), text.to_string());
        self
    }

    pub fn apply(&mut self, request: &WriteRequest) {
        if request.action != WriteAction::Unchanged {
            self.docs.insert(request.path.clone(), request.text.clone());
        }
    }
}

#[cfg(test)]
impl DocumentReader for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        if self.unreadable.contains(path) {
            anyhow::bail!("permission denied: {}", path.display());
        }
        Ok(self.docs.get(path).cloned())
    }
}
