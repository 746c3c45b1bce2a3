use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("feed item {id} rejected: {reason}")]
    Validation { id: String, reason: String },
    #[error("frontmatter malformed: {0}")]
    Format(String),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config invalid: {0}")]
    Config(String),
    #[error("feed unavailable: {0}")]
    Feed(String),
}

impl SyncError {
    pub fn validation(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxdErrorCode {
    E001Locked,
    E002FeedUnavailable,
    E003ItemRejected,
    E004NoteUnreadable,
    E005ConfigInvalid,
    E006WriteFailed,
}

impl BoxdErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002FeedUnavailable => "E002_FEED_UNAVAILABLE",
            Self::E003ItemRejected => "E003_ITEM_REJECTED",
            Self::E004NoteUnreadable => "E004_NOTE_UNREADABLE",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
            Self::E006WriteFailed => "E006_WRITE_FAILED",
        }
    }
}
