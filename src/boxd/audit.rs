use crate::boxd::paths::BoxdPaths;
use crate::boxd::util::now_epoch_secs;
use crate::boxd::warn::{self, WarnEvent};
use crate::error::BoxdErrorCode;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn audit_log_path(paths: &BoxdPaths) -> PathBuf {
    paths.logs_dir.join("audit.log")
}

pub fn append_event(paths: &BoxdPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = audit_log_path(paths);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Record a failure event while another error is already being returned.
/// A log that cannot be written becomes a warning instead of masking that error.
pub fn append_or_warn(paths: &BoxdPaths, phase: &str, status: &str, message: &str) -> bool {
    match append_event(paths, phase, status, message) {
        Ok(()) => true,
        Err(err) => {
            let err_text = format!("{err:#}");
            let log_path = audit_log_path(paths).display().to_string();
            warn::emit(&WarnEvent {
                code: BoxdErrorCode::E006WriteFailed.as_str(),
                stage: "audit",
                action: "skip-audit-event",
                path: &log_path,
                reason: status,
                err: &err_text,
                ..WarnEvent::default()
            });
            false
        }
    }
}
