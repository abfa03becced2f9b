//! Single owner of the archive registry.
//!
//! Lifecycle operations and engine event pumps talk to the registry only by
//! sending [`Command`]s; the worker applies them in order, recomputes
//! progress and notifies observers from one task.

use std::sync::Arc;

use hive_archive::{
    ArchiveEvent, ArchiveKey, ArchiveView, Manifest, Notifier, ProgressSink, SharedHandle,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::observer::UpdateObserver;
use crate::registry::{ArchiveEntry, ArchiveRegistry};
use crate::ManagerError;

pub(crate) type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    /// Adds a newly initialized archive; fails if the key is already known.
    Register {
        entry: ArchiveEntry,
        reply: Reply<Result<ArchiveView, ManagerError>>,
    },
    Remove {
        key: ArchiveKey,
        reply: Reply<Option<ArchiveView>>,
    },
    /// Records network membership and/or the persisted pause flag.
    Membership {
        key: ArchiveKey,
        network_joined: Option<bool>,
        paused: Option<bool>,
        reply: Reply<Result<ArchiveView, ManagerError>>,
    },
    Metadata {
        key: ArchiveKey,
        manifest: Manifest,
    },
    Event {
        key: ArchiveKey,
        event: ArchiveEvent,
    },
    Refresh {
        reply: Option<Reply<()>>,
    },
    Lookup {
        key: ArchiveKey,
        reply: Reply<Result<(SharedHandle, ArchiveView), ManagerError>>,
    },
    Get {
        key: ArchiveKey,
        reply: Reply<Result<ArchiveView, ManagerError>>,
    },
    List {
        reply: Reply<Vec<ArchiveView>>,
    },
    /// Escalates an error that has no caller to return to.
    Report {
        error: ManagerError,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

pub(crate) struct Hooks {
    pub(crate) observer: Arc<dyn UpdateObserver>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) progress: Arc<dyn ProgressSink>,
}

pub(crate) fn spawn(
    hooks: Hooks,
    coalesce_limit: usize,
    root: CancellationToken,
) -> mpsc::UnboundedSender<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = Worker {
        registry: ArchiveRegistry::default(),
        hooks,
        coalesce_limit,
        dirty: false,
        root,
    };
    tokio::spawn(worker.run(rx));
    tx
}

struct Worker {
    registry: ArchiveRegistry,
    hooks: Hooks,
    coalesce_limit: usize,
    dirty: bool,
    root: CancellationToken,
}

enum Flow {
    Continue,
    Stop,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        'outer: while let Some(command) = rx.recv().await {
            if let Flow::Stop = self.apply(command) {
                break;
            }
            let mut drained = 0;
            while drained < self.coalesce_limit {
                let Ok(command) = rx.try_recv() else {
                    break;
                };
                drained += 1;
                if let Flow::Stop = self.apply(command) {
                    break 'outer;
                }
            }
            if drained > 0 {
                trace!(target: "hive::progress", drained, "coalesced queued messages");
            }
            self.flush();
        }
        self.root.cancel();
        for entry in self.registry.drain() {
            entry.tasks.cancel();
        }
        debug!(target: "hive::archive", "archive manager stopped");
    }

    fn apply(&mut self, command: Command) -> Flow {
        match command {
            Command::Register { entry, reply } => {
                let key = entry.key();
                let result = if self.registry.contains(&key) {
                    entry.tasks.cancel();
                    Err(ManagerError::DuplicateArchive {
                        path: entry.handle.path().to_path_buf(),
                    })
                } else {
                    self.registry.upsert(entry);
                    self.dirty = true;
                    self.flush();
                    self.registry.get(&key)
                };
                let _ = reply.send(result);
            }
            Command::Remove { key, reply } => {
                let removed = self.registry.remove(&key).map(|entry| {
                    entry.tasks.cancel();
                    entry.view()
                });
                if removed.is_some() {
                    self.dirty = true;
                    self.flush();
                }
                let _ = reply.send(removed);
            }
            Command::Membership {
                key,
                network_joined,
                paused,
                reply,
            } => {
                let result = match self.registry.entry_mut(&key) {
                    Some(entry) => {
                        if let Some(joined) = network_joined {
                            entry.network_joined = joined;
                        }
                        if let Some(paused) = paused {
                            entry.paused = paused;
                        }
                        self.dirty = true;
                        self.flush();
                        self.registry.get(&key)
                    }
                    None => Err(ManagerError::NotFound(key)),
                };
                let _ = reply.send(result);
            }
            Command::Metadata { key, manifest } => {
                if let Some(entry) = self.registry.entry_mut(&key) {
                    entry.metadata = Some(manifest.metadata());
                    self.dirty = true;
                }
            }
            Command::Event { key, event } => match self.registry.entry_mut(&key) {
                Some(entry) => {
                    entry.observe(&event);
                    self.dirty = true;
                }
                None => {
                    trace!(target: "hive::archive", archive = %key, ?event, "event for unknown archive dropped");
                }
            },
            Command::Refresh { reply } => {
                self.dirty = true;
                if let Some(reply) = reply {
                    self.flush();
                    let _ = reply.send(());
                }
            }
            Command::Lookup { key, reply } => {
                self.flush();
                let result = self
                    .registry
                    .handle(&key)
                    .and_then(|handle| Ok((handle, self.registry.get(&key)?)));
                let _ = reply.send(result);
            }
            Command::Get { key, reply } => {
                self.flush();
                let _ = reply.send(self.registry.get(&key));
            }
            Command::List { reply } => {
                self.flush();
                let _ = reply.send(self.registry.list());
            }
            Command::Report { error } => {
                let archives = self.registry.list();
                self.hooks.observer.on_update(Some(&error), &archives);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Recomputes progress and notifies observers if anything changed since
    /// the last pass.
    ///
    /// Progress is read from the engine's current stats, so a download that
    /// starts and finishes between two passes is seen going straight from 0
    /// to complete and does not produce a completion notice.
    fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let outcome = self.registry.recompute();
        for completion in &outcome.completions {
            info!(
                target: "hive::progress",
                archive = %completion.key,
                title = %completion.title,
                "download finished"
            );
            self.hooks.notifier.completed(completion);
        }
        trace!(
            target: "hive::progress",
            archives = self.registry.len(),
            aggregate = outcome.aggregate,
            "progress recomputed"
        );
        self.hooks.progress.publish(outcome.aggregate);
        let archives = self.registry.list();
        self.hooks.observer.on_update(None, &archives);
    }
}
