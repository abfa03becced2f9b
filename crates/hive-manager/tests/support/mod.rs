#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hive_archive::{ArchiveView, Completion};
use hive_manager::{ArchiveManager, ManagerConfig, ManagerError};
use hive_mock_engine::{MemoryEngine, MemoryPauseStore};
use tempfile::TempDir;

pub type Updates = Arc<Mutex<Vec<(Option<ManagerError>, Vec<ArchiveView>)>>>;

pub struct Harness {
    pub engine: Arc<MemoryEngine>,
    pub store: Arc<MemoryPauseStore>,
    pub manager: ArchiveManager,
    pub updates: Updates,
    pub completions: Arc<Mutex<Vec<Completion>>>,
    pub progress: Arc<Mutex<Vec<f64>>>,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(MemoryEngine::new(), Arc::new(MemoryPauseStore::new()))
            .await
            .expect("manager starts")
    }

    pub async fn with(
        engine: Arc<MemoryEngine>,
        store: Arc<MemoryPauseStore>,
    ) -> Result<Self, ManagerError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let (manager, updates, completions, progress) =
            start(engine.clone(), store.clone(), &dir).await?;
        Ok(Self {
            engine,
            store,
            manager,
            updates,
            completions,
            progress,
            dir,
        })
    }

    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.progress.lock().expect("progress lock").last().copied()
    }

    pub fn completion_count(&self) -> usize {
        self.completions.lock().expect("completion lock").len()
    }

    pub fn errors(&self) -> Vec<ManagerError> {
        self.updates
            .lock()
            .expect("updates lock")
            .iter()
            .filter_map(|(err, _)| err.clone())
            .collect()
    }

    /// Polls the manager until `predicate` holds for the archive list.
    pub async fn eventually<F>(&self, predicate: F) -> Vec<ArchiveView>
    where
        F: Fn(&[ArchiveView]) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let archives = self.manager.list().await.expect("list");
                if predicate(&archives) {
                    return archives;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }
}

pub async fn start(
    engine: Arc<MemoryEngine>,
    store: Arc<MemoryPauseStore>,
    dir: &TempDir,
) -> Result<
    (
        ArchiveManager,
        Updates,
        Arc<Mutex<Vec<Completion>>>,
        Arc<Mutex<Vec<f64>>>,
    ),
    ManagerError,
> {
    let updates: Updates = Arc::default();
    let completions: Arc<Mutex<Vec<Completion>>> = Arc::default();
    let progress: Arc<Mutex<Vec<f64>>> = Arc::default();

    let config = ManagerConfig {
        downloads_dir: dir.path().join("downloads"),
        ..ManagerConfig::default()
    };
    let sink_updates = updates.clone();
    let sink_completions = completions.clone();
    let sink_progress = progress.clone();
    let manager = ArchiveManager::builder(engine, store)
        .config(config)
        .on_update(move |err, archives| {
            sink_updates
                .lock()
                .expect("updates lock")
                .push((err.cloned(), archives.to_vec()));
        })
        .notifier(move |completion: &Completion| {
            sink_completions
                .lock()
                .expect("completion lock")
                .push(completion.clone());
        })
        .progress_sink(move |value: f64| {
            sink_progress.lock().expect("progress lock").push(value);
        })
        .start()
        .await?;
    Ok((manager, updates, completions, progress))
}
