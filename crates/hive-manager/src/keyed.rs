use std::collections::HashMap;
use std::sync::Arc;

use hive_archive::ArchiveKey;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per archive key, created on demand and pruned once no
/// caller holds or waits on it.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<ArchiveKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, key: ArchiveKey) -> KeyGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        KeyGuard {
            locks: self,
            key,
            slot,
            guard: Some(guard),
        }
    }

    fn release(&self, key: &ArchiveKey, slot: &Arc<AsyncMutex<()>>) {
        let mut slots = self.slots.lock();
        // The map and the releasing guard hold the only references.
        if Arc::strong_count(slot) == 2 {
            if let Some(existing) = slots.get(key) {
                if Arc::ptr_eq(existing, slot) {
                    slots.remove(key);
                }
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

pub(crate) struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: ArchiveKey,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key, &self.slot);
    }
}
