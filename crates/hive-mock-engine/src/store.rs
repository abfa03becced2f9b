use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use hive_archive::{ArchiveKey, PauseStore, StoreError};
use parking_lot::Mutex;

/// Pause store backed by a map, with switchable failures and an optional
/// artificial latency on every call.
#[derive(Default)]
pub struct MemoryPauseStore {
    entries: Mutex<HashMap<ArchiveKey, bool>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    delay: Mutex<Option<Duration>>,
    writes: AtomicUsize,
}

impl MemoryPauseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (ArchiveKey, bool)>) -> Self {
        let store = Self::default();
        store.entries.lock().extend(entries);
        store
    }

    pub fn get(&self, key: &ArchiveKey) -> Option<bool> {
        self.entries.lock().get(key).copied()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl PauseStore for MemoryPauseStore {
    async fn read(&self) -> Result<HashMap<ArchiveKey, bool>, StoreError> {
        self.pause().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("injected read failure".into()));
        }
        Ok(self.entries.lock().clone())
    }

    async fn write(&self, key: &ArchiveKey, paused: bool) -> Result<(), StoreError> {
        self.pause().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                key: *key,
                reason: "injected write failure".into(),
            });
        }
        self.entries.lock().insert(*key, paused);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
