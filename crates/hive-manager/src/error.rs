use std::path::PathBuf;

use hive_archive::{ArchiveKey, EngineError, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("archive already exists at {}", .path.display())]
    DuplicateArchive { path: PathBuf },
    #[error("failed to prepare directory {}: {reason}", .path.display())]
    Directory { path: PathBuf, reason: String },
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("archive `{0}` not found")]
    NotFound(ArchiveKey),
    #[error("archive manager is not running")]
    Stopped,
}

impl ManagerError {
    /// Recoverable conditions surfaced to users as warnings rather than
    /// failures.
    pub fn is_warning(&self) -> bool {
        matches!(self, ManagerError::DuplicateArchive { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ManagerError::Validation(_) => "validation",
            ManagerError::DuplicateArchive { .. } => "duplicate_archive",
            ManagerError::Directory { .. } => "directory",
            ManagerError::Persistence(_) => "persistence",
            ManagerError::Engine(_) => "engine",
            ManagerError::NotFound(_) => "not_found",
            ManagerError::Stopped => "stopped",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            warning: self.is_warning(),
        }
    }
}

/// Serializable summary of an error, as published on the event bus.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    pub warning: bool,
}
