use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{ArchiveKey, ArchiveStats, CreateOptions, Manifest};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The target is already managed; reported when a concurrent creation
    /// claims the directory between the engine's check and its commit.
    #[error("archive conflict: {0}")]
    Conflict(String),
    #[error("archive `{0}` is not open in the engine")]
    UnknownArchive(ArchiveKey),
    #[error("network error: {0}")]
    Network(String),
    #[error("manifest error: {0}")]
    Manifest(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

/// Events an archive handle emits while it is open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveEvent {
    ConnectionOpened { peer: u64 },
    ConnectionClosed { peer: u64 },
    StatsUpdated,
    Ready,
    ContentAdded,
}

/// One open archive inside the engine.
#[async_trait::async_trait]
pub trait ArchiveHandle: Send + Sync {
    fn key(&self) -> ArchiveKey;

    fn path(&self) -> &Path;

    fn writable(&self) -> bool;

    /// Current replication counters; `None` while the engine has none yet.
    fn stats(&self) -> Option<ArchiveStats>;

    /// Stream of connection, stats, ready and content events.
    fn subscribe(&self) -> broadcast::Receiver<ArchiveEvent>;

    async fn join_network(&self) -> Result<(), EngineError>;

    async fn leave_network(&self) -> Result<(), EngineError>;

    async fn read_manifest(&self) -> Result<Manifest, EngineError>;

    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), EngineError>;

    /// Starts mirroring local filesystem changes into a writable archive.
    async fn import_files(&self) -> Result<(), EngineError>;
}

pub type SharedHandle = Arc<dyn ArchiveHandle>;

/// Result of [`ArchiveEngine::create`].
#[derive(Clone)]
pub struct Created {
    pub handle: SharedHandle,
    /// Set when the engine already managed an archive at the requested path.
    pub duplicate: bool,
}

impl Created {
    pub fn new(handle: SharedHandle) -> Self {
        Self {
            handle,
            duplicate: false,
        }
    }

    pub fn duplicate(handle: SharedHandle) -> Self {
        Self {
            handle,
            duplicate: true,
        }
    }
}

/// The replication engine that owns every archive's swarm state.
#[async_trait::async_trait]
pub trait ArchiveEngine: Send + Sync {
    /// Archives persisted by the engine from previous runs.
    async fn list(&self) -> Result<Vec<SharedHandle>, EngineError>;

    async fn create(&self, path: &Path, options: CreateOptions) -> Result<Created, EngineError>;

    async fn close(&self, key: &ArchiveKey) -> Result<(), EngineError>;
}
