//! In-memory stand-ins for the swarm engine and the pause store.
//!
//! Every archive lives in process memory; tests and the CLI simulation drive
//! replication by calling the control methods on [`MemoryHandle`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hive_archive::{
    ArchiveEngine, ArchiveEvent, ArchiveHandle, ArchiveKey, ArchiveStats, CreateOptions, Created,
    EngineError, Manifest, SharedHandle, KEY_LEN,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::debug;

mod store;

pub use store::MemoryPauseStore;

const EVENT_CAPACITY: usize = 256;

/// Derives the key a freshly created writable archive gets for `path`.
pub fn key_for_path(path: &Path) -> ArchiveKey {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&digest[..KEY_LEN]);
    ArchiveKey::from_bytes(bytes)
}

#[derive(Default)]
struct HandleState {
    stats: Option<ArchiveStats>,
    joined: bool,
    manifest: Option<Manifest>,
    importing: bool,
    next_peer: u64,
    peers: HashSet<u64>,
    fail_network: bool,
    fail_manifest: bool,
    join_calls: usize,
    leave_calls: usize,
}

/// One archive held by [`MemoryEngine`].
pub struct MemoryHandle {
    key: ArchiveKey,
    path: PathBuf,
    writable: bool,
    state: Mutex<HandleState>,
    events: broadcast::Sender<ArchiveEvent>,
}

impl MemoryHandle {
    pub fn new(key: ArchiveKey, path: impl Into<PathBuf>, writable: bool) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            key,
            path: path.into(),
            writable,
            state: Mutex::new(HandleState::default()),
            events,
        })
    }

    /// Replaces the replication counters and emits a stats update.
    pub fn set_stats(&self, downloaded: u64, length: u64) {
        self.state.lock().stats = Some(ArchiveStats { downloaded, length });
        self.emit(ArchiveEvent::StatsUpdated);
    }

    pub fn clear_stats(&self) {
        self.state.lock().stats = None;
    }

    pub fn set_manifest(&self, manifest: Manifest) {
        self.state.lock().manifest = Some(manifest);
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.state.lock().manifest.clone()
    }

    pub fn fail_network(&self, fail: bool) {
        self.state.lock().fail_network = fail;
    }

    pub fn fail_manifest_reads(&self, fail: bool) {
        self.state.lock().fail_manifest = fail;
    }

    /// Simulates a peer connecting; returns its id for [`Self::close_connection`].
    pub fn open_connection(&self) -> u64 {
        let peer = {
            let mut state = self.state.lock();
            state.next_peer += 1;
            let peer = state.next_peer;
            state.peers.insert(peer);
            peer
        };
        self.emit(ArchiveEvent::ConnectionOpened { peer });
        peer
    }

    pub fn close_connection(&self, peer: u64) {
        let removed = self.state.lock().peers.remove(&peer);
        if removed {
            self.emit(ArchiveEvent::ConnectionClosed { peer });
        }
    }

    pub fn mark_ready(&self) {
        self.emit(ArchiveEvent::Ready);
    }

    pub fn add_content(&self) {
        self.emit(ArchiveEvent::ContentAdded);
    }

    pub fn emit(&self, event: ArchiveEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_joined(&self) -> bool {
        self.state.lock().joined
    }

    pub fn is_importing(&self) -> bool {
        self.state.lock().importing
    }

    pub fn join_calls(&self) -> usize {
        self.state.lock().join_calls
    }

    pub fn leave_calls(&self) -> usize {
        self.state.lock().leave_calls
    }

    fn drop_peers(&self) {
        let peers: Vec<u64> = self.state.lock().peers.drain().collect();
        for peer in peers {
            self.emit(ArchiveEvent::ConnectionClosed { peer });
        }
    }
}

#[async_trait::async_trait]
impl ArchiveHandle for MemoryHandle {
    fn key(&self) -> ArchiveKey {
        self.key
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn stats(&self) -> Option<ArchiveStats> {
        self.state.lock().stats
    }

    fn subscribe(&self) -> broadcast::Receiver<ArchiveEvent> {
        self.events.subscribe()
    }

    async fn join_network(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.join_calls += 1;
        if state.fail_network {
            return Err(EngineError::Network("join refused".into()));
        }
        state.joined = true;
        Ok(())
    }

    async fn leave_network(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            state.leave_calls += 1;
            if state.fail_network {
                return Err(EngineError::Network("leave refused".into()));
            }
            state.joined = false;
        }
        self.drop_peers();
        Ok(())
    }

    async fn read_manifest(&self) -> Result<Manifest, EngineError> {
        let state = self.state.lock();
        if state.fail_manifest {
            return Err(EngineError::Manifest("manifest unreadable".into()));
        }
        state
            .manifest
            .clone()
            .ok_or_else(|| EngineError::Manifest("no manifest written".into()))
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), EngineError> {
        self.state.lock().manifest = Some(manifest.clone());
        Ok(())
    }

    async fn import_files(&self) -> Result<(), EngineError> {
        if !self.writable {
            return Err(EngineError::Io("archive is read-only".into()));
        }
        self.state.lock().importing = true;
        Ok(())
    }
}

#[derive(Default)]
struct EngineState {
    archives: Vec<Arc<MemoryHandle>>,
    create_calls: Vec<(PathBuf, CreateOptions)>,
    fail_next_create: Option<EngineError>,
    fail_next_close: Option<EngineError>,
}

/// Engine keeping every archive in memory, in creation order.
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds an archive as if persisted by a previous run.
    pub fn insert(&self, handle: Arc<MemoryHandle>) {
        self.state.lock().archives.push(handle);
    }

    pub fn handle(&self, key: &ArchiveKey) -> Option<Arc<MemoryHandle>> {
        self.state
            .lock()
            .archives
            .iter()
            .find(|handle| handle.key == *key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_create_options(&self) -> Option<CreateOptions> {
        self.state
            .lock()
            .create_calls
            .last()
            .map(|(_, options)| options.clone())
    }

    pub fn fail_next_create(&self, err: EngineError) {
        self.state.lock().fail_next_create = Some(err);
    }

    pub fn fail_next_close(&self, err: EngineError) {
        self.state.lock().fail_next_close = Some(err);
    }
}

#[async_trait::async_trait]
impl ArchiveEngine for MemoryEngine {
    async fn list(&self) -> Result<Vec<SharedHandle>, EngineError> {
        Ok(self
            .state
            .lock()
            .archives
            .iter()
            .map(|handle| handle.clone() as SharedHandle)
            .collect())
    }

    async fn create(&self, path: &Path, options: CreateOptions) -> Result<Created, EngineError> {
        let mut state = self.state.lock();
        state
            .create_calls
            .push((path.to_path_buf(), options.clone()));
        if let Some(err) = state.fail_next_create.take() {
            return Err(err);
        }
        if let Some(existing) = state.archives.iter().find(|handle| handle.path == path) {
            return Ok(Created::duplicate(existing.clone()));
        }
        let (key, writable) = match options.key {
            Some(key) => (key, false),
            None => (key_for_path(path), true),
        };
        if state.archives.iter().any(|handle| handle.key == key) {
            return Err(EngineError::Conflict(format!(
                "archive {key} is already open elsewhere"
            )));
        }
        let handle = MemoryHandle::new(key, path, writable);
        state.archives.push(handle.clone());
        debug!(target: "hive::mock", archive = %key, path = %path.display(), "archive created");
        Ok(Created::new(handle))
    }

    async fn close(&self, key: &ArchiveKey) -> Result<(), EngineError> {
        let handle = {
            let mut state = self.state.lock();
            if let Some(err) = state.fail_next_close.take() {
                return Err(err);
            }
            let idx = state
                .archives
                .iter()
                .position(|handle| handle.key == *key)
                .ok_or(EngineError::UnknownArchive(*key))?;
            state.archives.remove(idx)
        };
        handle.state.lock().joined = false;
        handle.drop_peers();
        Ok(())
    }
}
