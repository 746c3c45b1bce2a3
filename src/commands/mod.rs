pub mod preview;
pub mod status;
pub mod sync;

use crate::boxd::config::BoxdConfig;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Flag-level overrides shared by `sync` and `preview`; applied on top of
/// the file and environment layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub feed: Option<String>,
    pub sort: Option<String>,
    pub variant: Option<String>,
    pub notes: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut BoxdConfig) {
        if let Some(feed) = self.feed.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            cfg.feed.url = Some(feed.to_string());
        }
        if let Some(sort) = &self.sort {
            cfg.diary.sort = sort.clone();
        }
        if let Some(variant) = &self.variant {
            cfg.diary.variant = variant.clone();
        }
        if let Some(notes) = self.notes {
            cfg.notes.enabled = notes;
        }
    }
}
