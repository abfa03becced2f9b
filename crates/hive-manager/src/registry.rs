use std::collections::HashMap;

use hive_archive::{
    ArchiveEvent, ArchiveKey, ArchiveMetadata, ArchiveView, Completion, SharedHandle,
};
use tokio_util::sync::CancellationToken;

use crate::progress::{aggregate, archive_progress, finished_downloading};
use crate::ManagerError;

/// Runtime state the manager keeps for one archive.
pub(crate) struct ArchiveEntry {
    pub(crate) handle: SharedHandle,
    pub(crate) network_joined: bool,
    pub(crate) paused: bool,
    pub(crate) progress: f64,
    pub(crate) metadata: Option<ArchiveMetadata>,
    pub(crate) connections: usize,
    /// Cancels the archive's event and manifest tasks.
    pub(crate) tasks: CancellationToken,
}

impl ArchiveEntry {
    pub(crate) fn new(handle: SharedHandle, paused: bool, tasks: CancellationToken) -> Self {
        Self {
            handle,
            network_joined: !paused,
            paused,
            progress: 0.0,
            metadata: None,
            connections: 0,
            tasks,
        }
    }

    pub(crate) fn key(&self) -> ArchiveKey {
        self.handle.key()
    }

    pub(crate) fn view(&self) -> ArchiveView {
        ArchiveView {
            key: self.handle.key(),
            path: self.handle.path().to_path_buf(),
            writable: self.handle.writable(),
            network_joined: self.network_joined,
            paused: self.paused,
            progress: self.progress,
            metadata: self.metadata.clone(),
            connections: self.connections,
        }
    }

    pub(crate) fn observe(&mut self, event: &ArchiveEvent) {
        match event {
            ArchiveEvent::ConnectionOpened { .. } => self.connections += 1,
            ArchiveEvent::ConnectionClosed { .. } => {
                self.connections = self.connections.saturating_sub(1)
            }
            ArchiveEvent::StatsUpdated | ArchiveEvent::Ready | ArchiveEvent::ContentAdded => {}
        }
    }

    fn title(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|meta| meta.title.as_deref())
    }
}

/// Outcome of a whole-table progress pass.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recomputed {
    pub(crate) aggregate: f64,
    pub(crate) completions: Vec<Completion>,
}

/// Archives known to the manager, listed in registration order.
#[derive(Default)]
pub(crate) struct ArchiveRegistry {
    order: Vec<ArchiveKey>,
    entries: HashMap<ArchiveKey, ArchiveEntry>,
}

impl ArchiveRegistry {
    pub(crate) fn list(&self) -> Vec<ArchiveView> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .map(ArchiveEntry::view)
            .collect()
    }

    pub(crate) fn get(&self, key: &ArchiveKey) -> Result<ArchiveView, ManagerError> {
        self.entries
            .get(key)
            .map(ArchiveEntry::view)
            .ok_or(ManagerError::NotFound(*key))
    }

    pub(crate) fn contains(&self, key: &ArchiveKey) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn entry_mut(&mut self, key: &ArchiveKey) -> Option<&mut ArchiveEntry> {
        self.entries.get_mut(key)
    }

    pub(crate) fn handle(&self, key: &ArchiveKey) -> Result<SharedHandle, ManagerError> {
        self.entries
            .get(key)
            .map(|entry| entry.handle.clone())
            .ok_or(ManagerError::NotFound(*key))
    }

    /// Inserts or replaces the entry for its key. Returns the replaced entry;
    /// a replacement keeps the key's listing position.
    pub(crate) fn upsert(&mut self, entry: ArchiveEntry) -> Option<ArchiveEntry> {
        let key = entry.key();
        let previous = self.entries.insert(key, entry);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub(crate) fn remove(&mut self, key: &ArchiveKey) -> Option<ArchiveEntry> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|existing| existing != key);
        Some(removed)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Re-derives every archive's progress from the engine's stats and
    /// aggregates the swarm-wide value.
    pub(crate) fn recompute(&mut self) -> Recomputed {
        let mut completions = Vec::new();
        for key in &self.order {
            let Some(entry) = self.entries.get_mut(key) else {
                continue;
            };
            let previous = entry.progress;
            entry.progress = archive_progress(entry.handle.stats(), entry.handle.writable());
            if finished_downloading(previous, entry.progress) {
                completions.push(Completion::new(*key, entry.title(), entry.handle.path()));
            }
        }
        let aggregate = aggregate(
            self.order
                .iter()
                .filter_map(|key| self.entries.get(key))
                .map(|entry| (entry.network_joined, entry.progress)),
        );
        Recomputed {
            aggregate,
            completions,
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<ArchiveEntry> {
        self.order.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hive_archive::{ArchiveHandle, KEY_LEN, PROGRESS_IDLE};
    use hive_mock_engine::MemoryHandle;

    fn handle(byte: u8, writable: bool) -> Arc<MemoryHandle> {
        MemoryHandle::new(
            ArchiveKey::from_bytes([byte; KEY_LEN]),
            format!("/tmp/archive-{byte}"),
            writable,
        )
    }

    fn entry(handle: &Arc<MemoryHandle>, paused: bool) -> ArchiveEntry {
        ArchiveEntry::new(handle.clone(), paused, CancellationToken::new())
    }

    #[test]
    fn listing_keeps_registration_order() {
        let mut registry = ArchiveRegistry::default();
        let (a, b, c) = (handle(3, false), handle(1, false), handle(2, false));
        for h in [&a, &b, &c] {
            assert!(registry.upsert(entry(h, false)).is_none());
        }
        assert!(registry.upsert(entry(&b, true)).is_some());

        let keys: Vec<u8> = registry
            .list()
            .iter()
            .map(|view| view.key.as_bytes()[0])
            .collect();
        assert_eq!(keys, vec![3, 1, 2]);
        assert!(registry.list()[1].paused);

        registry.remove(&b.key());
        assert_eq!(registry.len(), 2);
        assert!(matches!(
            registry.get(&b.key()),
            Err(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn recompute_reports_each_completion_once() {
        let mut registry = ArchiveRegistry::default();
        let remote = handle(9, false);
        registry.upsert(entry(&remote, false));

        remote.set_stats(50, 200);
        let first = registry.recompute();
        assert_eq!(first.aggregate, 0.25);
        assert!(first.completions.is_empty());

        remote.set_stats(200, 200);
        let done = registry.recompute();
        assert_eq!(done.aggregate, PROGRESS_IDLE);
        assert_eq!(done.completions.len(), 1);
        assert_eq!(done.completions[0].title, remote.key().to_hex());

        let again = registry.recompute();
        assert!(again.completions.is_empty());
    }

    #[test]
    fn download_finished_between_passes_is_not_a_completion() {
        let mut registry = ArchiveRegistry::default();
        let remote = handle(10, false);
        registry.upsert(entry(&remote, false));

        remote.set_stats(50, 200);
        remote.set_stats(200, 200);
        let outcome = registry.recompute();
        assert!(outcome.completions.is_empty());
        assert_eq!(registry.list()[0].progress, 1.0);
        assert_eq!(outcome.aggregate, PROGRESS_IDLE);
    }

    #[test]
    fn paused_and_complete_archives_do_not_dilute_aggregate() {
        let mut registry = ArchiveRegistry::default();
        let active = handle(1, false);
        let paused = handle(2, false);
        let origin = handle(3, true);
        registry.upsert(entry(&active, false));
        registry.upsert(entry(&paused, true));
        registry.upsert(entry(&origin, false));

        active.set_stats(40, 100);
        paused.set_stats(5, 100);
        origin.set_stats(0, 10);
        let outcome = registry.recompute();
        assert_eq!(outcome.aggregate, 0.4);

        let views = registry.list();
        assert_eq!(views[2].progress, 1.0);
        for view in views {
            assert!((0.0..=1.0).contains(&view.progress));
        }
    }

    #[test]
    fn connection_events_track_live_peers() {
        let h = handle(4, false);
        let mut e = entry(&h, false);
        e.observe(&ArchiveEvent::ConnectionOpened { peer: 1 });
        e.observe(&ArchiveEvent::ConnectionOpened { peer: 2 });
        e.observe(&ArchiveEvent::ConnectionClosed { peer: 1 });
        e.observe(&ArchiveEvent::ConnectionClosed { peer: 2 });
        e.observe(&ArchiveEvent::ConnectionClosed { peer: 2 });
        assert_eq!(e.connections, 0);
        e.observe(&ArchiveEvent::ConnectionOpened { peer: 3 });
        assert_eq!(e.view().connections, 1);
    }
}
