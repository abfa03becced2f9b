use std::collections::HashMap;

use crate::ArchiveKey;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("pause store read failed: {0}")]
    Read(String),
    #[error("pause store write failed for `{key}`: {reason}")]
    Write { key: ArchiveKey, reason: String },
    #[error("pause store unavailable: {0}")]
    Unavailable(String),
}

/// Durable archive key -> paused flag mapping.
///
/// Keys without an entry are treated as not paused.
#[async_trait::async_trait]
pub trait PauseStore: Send + Sync {
    async fn read(&self) -> Result<HashMap<ArchiveKey, bool>, StoreError>;

    async fn write(&self, key: &ArchiveKey, paused: bool) -> Result<(), StoreError>;

    async fn is_paused(&self, key: &ArchiveKey) -> Result<bool, StoreError> {
        Ok(self.read().await?.get(key).copied().unwrap_or(false))
    }
}
