use std::path::Path;
use std::sync::Arc;

use hive_archive::{
    ArchiveEngine, ArchiveKey, ArchiveView, CreateOptions, Discard, EngineError, Manifest,
    Notifier, PauseStore, ProgressSink, SharedHandle,
};
use hive_events::Bus;
use hive_topics::{
    TOPIC_ARCHIVE_CLOSED, TOPIC_ARCHIVE_CREATED, TOPIC_ARCHIVE_PAUSED, TOPIC_ARCHIVE_RESUMED,
};
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actor::{self, Command, Hooks};
use crate::keyed::KeyedLocks;
use crate::observer::UpdateObserver;
use crate::registry::ArchiveEntry;
use crate::{ManagerConfig, ManagerError};

struct ManagerInner {
    engine: Arc<dyn ArchiveEngine>,
    store: Arc<dyn PauseStore>,
    commands: mpsc::UnboundedSender<Command>,
    locks: KeyedLocks,
    config: ManagerConfig,
    bus: Option<Bus>,
    root: CancellationToken,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Owns every managed archive's lifecycle and reports replication progress.
///
/// Cloning is cheap; all clones drive the same registry.
#[derive(Clone)]
pub struct ArchiveManager {
    inner: Arc<ManagerInner>,
}

/// Wires the collaborators of an [`ArchiveManager`] before it starts.
pub struct ManagerBuilder {
    engine: Arc<dyn ArchiveEngine>,
    store: Arc<dyn PauseStore>,
    observer: Arc<dyn UpdateObserver>,
    notifier: Arc<dyn Notifier>,
    progress: Arc<dyn ProgressSink>,
    bus: Option<Bus>,
    config: ManagerConfig,
}

impl ManagerBuilder {
    pub fn observer(mut self, observer: impl UpdateObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn on_update<F>(self, callback: F) -> Self
    where
        F: Fn(Option<&ManagerError>, &[ArchiveView]) + Send + Sync + 'static,
    {
        self.observer(callback)
    }

    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn progress_sink(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Arc::new(sink);
        self
    }

    /// Publishes lifecycle transitions (created, paused, resumed, closed).
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the registry worker and reconstructs every archive the engine
    /// already knows about.
    ///
    /// Fails if any persisted archive cannot be initialized; the pause flags
    /// would otherwise drift from actual network membership.
    pub async fn start(self) -> Result<ArchiveManager, ManagerError> {
        let root = CancellationToken::new();
        let commands = actor::spawn(
            Hooks {
                observer: self.observer,
                notifier: self.notifier,
                progress: self.progress,
            },
            self.config.coalesce_limit,
            root.clone(),
        );
        let manager = ArchiveManager {
            inner: Arc::new(ManagerInner {
                engine: self.engine,
                store: self.store,
                commands,
                locks: KeyedLocks::default(),
                config: self.config,
                bus: self.bus,
                root,
            }),
        };

        let handles = match manager.inner.engine.list().await {
            Ok(handles) => handles,
            Err(err) => {
                let err = ManagerError::from(err);
                error!(target: "hive::archive", error = %err, "failed to list persisted archives");
                manager.shutdown().await;
                return Err(err);
            }
        };
        let restored = handles.len();
        for handle in handles {
            let key = handle.key();
            let _guard = manager.inner.locks.lock(key).await;
            if let Err(err) = manager.initialize(handle).await {
                error!(
                    target: "hive::archive",
                    archive = %key,
                    error = %err,
                    "failed to restore archive"
                );
                manager.shutdown().await;
                return Err(err);
            }
        }
        manager.refresh().await?;
        info!(target: "hive::archive", restored, "archive manager started");
        Ok(manager)
    }
}

impl ArchiveManager {
    pub fn builder(engine: Arc<dyn ArchiveEngine>, store: Arc<dyn PauseStore>) -> ManagerBuilder {
        ManagerBuilder {
            engine,
            store,
            observer: Arc::new(|_: Option<&ManagerError>, _: &[ArchiveView]| {}),
            notifier: Arc::new(Discard),
            progress: Arc::new(Discard),
            bus: None,
            config: ManagerConfig::default(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Snapshot of every managed archive in registration order.
    pub async fn list(&self) -> Result<Vec<ArchiveView>, ManagerError> {
        self.request(|reply| Command::List { reply }).await
    }

    pub async fn get(&self, key: &ArchiveKey) -> Result<ArchiveView, ManagerError> {
        let key = *key;
        self.request(|reply| Command::Get { key, reply }).await?
    }

    /// Creates (or starts replicating) an archive rooted at `dir`.
    ///
    /// The managed policy flags always override those in `options`.
    pub async fn create(
        &self,
        dir: impl AsRef<Path>,
        options: CreateOptions,
    ) -> Result<ArchiveView, ManagerError> {
        let dir = dir.as_ref();
        validate_dir(dir)?;
        if let Some(key) = options.key {
            if self.get(&key).await.is_ok() {
                return Err(ManagerError::DuplicateArchive {
                    path: dir.to_path_buf(),
                });
            }
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| ManagerError::Directory {
                path: dir.to_path_buf(),
                reason: err.to_string(),
            })?;

        let created = match self
            .inner
            .engine
            .create(dir, options.with_managed_policy())
            .await
        {
            Ok(created) if created.duplicate => {
                warn!(target: "hive::archive", path = %dir.display(), "archive already exists");
                return Err(ManagerError::DuplicateArchive {
                    path: dir.to_path_buf(),
                });
            }
            Ok(created) => created,
            Err(EngineError::Conflict(reason)) => {
                warn!(
                    target: "hive::archive",
                    path = %dir.display(),
                    %reason,
                    "archive creation raced with an existing archive"
                );
                return Err(ManagerError::DuplicateArchive {
                    path: dir.to_path_buf(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let handle = created.handle;
        let key = handle.key();
        let _guard = self.inner.locks.lock(key).await;
        if self.get(&key).await.is_ok() {
            return Err(ManagerError::DuplicateArchive {
                path: dir.to_path_buf(),
            });
        }
        let view = match self.set_up_created(handle).await {
            Ok(view) => view,
            Err(err) => {
                // The engine opened the archive but nothing tracks it; close
                // it so the directory can be created again.
                if let Err(close_err) = self.inner.engine.close(&key).await {
                    warn!(
                        target: "hive::archive",
                        archive = %key,
                        error = %close_err,
                        "failed to close archive after setup failure"
                    );
                }
                return Err(err);
            }
        };
        info!(
            target: "hive::archive",
            archive = %key,
            path = %dir.display(),
            writable = view.writable,
            "archive created"
        );
        self.publish(TOPIC_ARCHIVE_CREATED, &view);
        Ok(view)
    }

    /// Starts replicating the archive behind a share link into the
    /// configured downloads directory.
    pub async fn download(&self, link: &str) -> Result<ArchiveView, ManagerError> {
        let key = ArchiveKey::parse_link(link)
            .map_err(|err| ManagerError::Validation(format!("invalid link: {err}")))?;
        let dir = self.inner.config.downloads_dir.join(key.to_hex());
        self.create(dir, CreateOptions::download(key)).await
    }

    /// Removes an archive from management and closes it in the engine.
    ///
    /// The pause flag is cleared first; if that write fails the engine is
    /// left untouched.
    pub async fn close(&self, key: &ArchiveKey) -> Result<(), ManagerError> {
        let _guard = self.inner.locks.lock(*key).await;
        let (_, view) = self.lookup(key).await?;
        self.inner.store.write(key, false).await?;
        self.inner.engine.close(key).await?;
        let key = *key;
        self.request(|reply| Command::Remove { key, reply }).await?;
        info!(target: "hive::archive", archive = %key, "archive closed");
        self.publish(TOPIC_ARCHIVE_CLOSED, &view);
        Ok(())
    }

    /// Leaves the swarm and persists the paused flag. Pausing a paused
    /// archive is a no-op.
    pub async fn pause(&self, key: &ArchiveKey) -> Result<(), ManagerError> {
        let _guard = self.inner.locks.lock(*key).await;
        self.pause_locked(key).await
    }

    /// Rejoins the swarm and clears the paused flag. Resuming a running
    /// archive is a no-op.
    pub async fn resume(&self, key: &ArchiveKey) -> Result<(), ManagerError> {
        let _guard = self.inner.locks.lock(*key).await;
        self.resume_locked(key).await
    }

    /// Pauses or resumes depending on the persisted flag.
    pub async fn toggle_pause(&self, key: &ArchiveKey) -> Result<(), ManagerError> {
        let _guard = self.inner.locks.lock(*key).await;
        self.lookup(key).await?;
        if self.inner.store.is_paused(key).await? {
            self.resume_locked(key).await
        } else {
            self.pause_locked(key).await
        }
    }

    /// Stops the registry worker and every archive task. Later calls fail
    /// with [`ManagerError::Stopped`].
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .inner
            .commands
            .send(Command::Shutdown { reply })
            .is_ok()
        {
            let _ = rx.await;
        }
        self.inner.root.cancel();
    }

    // `network_joined` flips as soon as the engine call returns and `paused`
    // once the store write lands, so observers may briefly see the two
    // disagree while a transition is in flight.
    async fn pause_locked(&self, key: &ArchiveKey) -> Result<(), ManagerError> {
        let (handle, view) = self.lookup(key).await?;
        if view.paused && !view.network_joined {
            debug!(target: "hive::archive", archive = %key, "already paused");
            return Ok(());
        }
        if view.network_joined {
            handle.leave_network().await?;
            self.set_membership(key, Some(false), None).await?;
        }
        self.inner.store.write(key, true).await?;
        let view = self.set_membership(key, None, Some(true)).await?;
        info!(target: "hive::archive", archive = %key, "archive paused");
        self.publish(TOPIC_ARCHIVE_PAUSED, &view);
        Ok(())
    }

    async fn resume_locked(&self, key: &ArchiveKey) -> Result<(), ManagerError> {
        let (handle, view) = self.lookup(key).await?;
        if !view.paused && view.network_joined {
            debug!(target: "hive::archive", archive = %key, "already running");
            return Ok(());
        }
        if !view.network_joined {
            handle.join_network().await?;
            self.set_membership(key, Some(true), None).await?;
        }
        self.inner.store.write(key, false).await?;
        let view = self.set_membership(key, None, Some(false)).await?;
        info!(target: "hive::archive", archive = %key, "archive resumed");
        self.publish(TOPIC_ARCHIVE_RESUMED, &view);
        Ok(())
    }

    async fn set_up_created(&self, handle: SharedHandle) -> Result<ArchiveView, ManagerError> {
        if handle.writable() {
            let manifest = Manifest::for_new_archive(&handle.key(), handle.path(), true);
            handle.write_manifest(&manifest).await?;
        }
        self.initialize(handle).await
    }

    /// Registers `handle` and wires its engine events into the registry.
    /// Callers hold the key's lock.
    async fn initialize(&self, handle: SharedHandle) -> Result<ArchiveView, ManagerError> {
        let key = handle.key();
        let events = handle.subscribe();
        let paused = match self.inner.store.is_paused(&key).await {
            Ok(paused) => paused,
            Err(err) => {
                let err = ManagerError::from(err);
                error!(
                    target: "hive::archive",
                    archive = %key,
                    error = %err,
                    "pause flag unreadable; archive left unmanaged"
                );
                self.report(err.clone());
                return Err(err);
            }
        };
        if !paused {
            handle.join_network().await?;
        }

        let tasks = self.inner.root.child_token();
        let entry = ArchiveEntry::new(handle.clone(), paused, tasks.clone());
        let view = self
            .request(|reply| Command::Register { entry, reply })
            .await??;

        spawn_event_pump(key, events, self.inner.commands.clone(), tasks.clone());
        spawn_manifest_read(handle.clone(), self.inner.commands.clone(), tasks);

        if handle.writable() {
            if let Err(err) = handle.import_files().await {
                warn!(
                    target: "hive::archive",
                    archive = %key,
                    error = %err,
                    "failed to start importing local files"
                );
            }
        }
        debug!(target: "hive::archive", archive = %key, paused, "archive initialized");
        Ok(view)
    }

    async fn lookup(&self, key: &ArchiveKey) -> Result<(SharedHandle, ArchiveView), ManagerError> {
        let key = *key;
        self.request(|reply| Command::Lookup { key, reply }).await?
    }

    async fn set_membership(
        &self,
        key: &ArchiveKey,
        network_joined: Option<bool>,
        paused: Option<bool>,
    ) -> Result<ArchiveView, ManagerError> {
        let key = *key;
        self.request(|reply| Command::Membership {
            key,
            network_joined,
            paused,
            reply,
        })
        .await?
    }

    async fn refresh(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::Refresh { reply: Some(reply) })
            .await
    }

    fn report(&self, error: ManagerError) {
        let _ = self.inner.commands.send(Command::Report { error });
    }

    fn publish(&self, topic: &str, view: &ArchiveView) {
        if let Some(bus) = &self.inner.bus {
            bus.publish(
                topic,
                &json!({
                    "key": view.key,
                    "path": view.path,
                    "paused": view.paused,
                    "network_joined": view.network_joined,
                }),
            );
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .commands
            .send(build(reply))
            .map_err(|_| ManagerError::Stopped)?;
        rx.await.map_err(|_| ManagerError::Stopped)
    }
}

fn validate_dir(dir: &Path) -> Result<(), ManagerError> {
    let raw = dir.as_os_str();
    if raw.is_empty() {
        return Err(ManagerError::Validation("archive directory is empty".into()));
    }
    if raw.to_string_lossy().contains('\0') {
        return Err(ManagerError::Validation(
            "archive directory contains a NUL byte".into(),
        ));
    }
    Ok(())
}

fn spawn_event_pump(
    key: ArchiveKey,
    mut events: broadcast::Receiver<hive_archive::ArchiveEvent>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => Command::Event { key, event },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target: "hive::archive", archive = %key, skipped, "archive events lagged");
                        Command::Refresh { reply: None }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if commands.send(command).is_err() {
                break;
            }
        }
    });
}

fn spawn_manifest_read(
    handle: SharedHandle,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let key = handle.key();
        let manifest = tokio::select! {
            _ = cancel.cancelled() => return,
            manifest = handle.read_manifest() => manifest,
        };
        match manifest {
            Ok(manifest) => {
                let _ = commands.send(Command::Metadata { key, manifest });
            }
            Err(err) => {
                debug!(target: "hive::archive", archive = %key, error = %err, "manifest unavailable");
            }
        }
    });
}
