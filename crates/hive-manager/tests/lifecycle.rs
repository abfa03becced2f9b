mod support;

use std::sync::Arc;
use std::time::Duration;

use hive_archive::{
    ArchiveKey, CreateOptions, EngineError, Manifest, PauseStore, StoreError, KEY_LEN,
};
use hive_events::Bus;
use hive_manager::{ArchiveManager, ManagerError};
use hive_mock_engine::{key_for_path, MemoryEngine, MemoryHandle, MemoryPauseStore};
use hive_topics::TOPIC_ARCHIVE_CREATED;
use support::Harness;

fn remote_key(byte: u8) -> ArchiveKey {
    ArchiveKey::from_bytes([byte; KEY_LEN])
}

#[tokio::test]
async fn create_registers_a_joined_archive_without_progress() {
    let h = Harness::new().await;
    let dir = h.path("a");

    let caller_opts = CreateOptions {
        watch: false,
        ..CreateOptions::default()
    };
    let view = h.manager.create(&dir, caller_opts).await.expect("create");

    assert!(dir.is_dir());
    assert_eq!(view.path, dir);
    assert!(view.writable);
    assert!(view.network_joined);
    assert!(!view.paused);
    assert_eq!(view.progress, 0.0);

    let archives = h.manager.list().await.expect("list");
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].key, key_for_path(&dir));

    let options = h.engine.last_create_options().expect("engine saw create");
    assert!(options.watch && options.resume && options.ignore_hidden && options.compare_file_content);

    let handle = h.engine.handle(&view.key).expect("engine handle");
    assert!(handle.is_joined());
    assert!(handle.is_importing());
    assert_eq!(handle.manifest().and_then(|m| m.title).as_deref(), Some("a"));
    assert!(!h.updates.lock().expect("updates").is_empty());
}

#[tokio::test]
async fn duplicate_create_is_a_warning_and_adds_nothing() {
    let h = Harness::new().await;
    let dir = h.path("dup");
    h.manager
        .create(&dir, CreateOptions::default())
        .await
        .expect("first create");

    let err = h
        .manager
        .create(&dir, CreateOptions::default())
        .await
        .expect_err("duplicate");
    assert!(matches!(err, ManagerError::DuplicateArchive { .. }));
    assert!(err.is_warning());
    assert_eq!(h.manager.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn engine_conflict_is_reported_as_duplicate() {
    let h = Harness::new().await;
    h.engine
        .fail_next_create(EngineError::Conflict("claimed concurrently".into()));
    let err = h
        .manager
        .create(h.path("race"), CreateOptions::default())
        .await
        .expect_err("conflict");
    assert!(matches!(err, ManagerError::DuplicateArchive { .. }));
    assert!(h.manager.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn other_engine_failures_surface_as_engine_errors() {
    let h = Harness::new().await;
    h.engine
        .fail_next_create(EngineError::Unavailable("swarm offline".into()));
    let err = h
        .manager
        .create(h.path("x"), CreateOptions::default())
        .await
        .expect_err("engine failure");
    assert!(matches!(err, ManagerError::Engine(EngineError::Unavailable(_))));
    assert!(!err.is_warning());
}

#[tokio::test]
async fn unusable_directory_aborts_before_the_engine() {
    let h = Harness::new().await;
    let file = h.path("plain-file");
    std::fs::write(&file, b"not a directory").expect("write file");

    let err = h
        .manager
        .create(file.join("nested"), CreateOptions::default())
        .await
        .expect_err("directory failure");
    assert!(matches!(err, ManagerError::Directory { .. }));
    assert!(h.engine.last_create_options().is_none());

    let err = h
        .manager
        .create("", CreateOptions::default())
        .await
        .expect_err("validation");
    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn pause_and_resume_round_trip_idempotently() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("p"), CreateOptions::default())
        .await
        .expect("create");
    let handle = h.engine.handle(&view.key).expect("handle");

    h.manager.pause(&view.key).await.expect("pause");
    h.manager.pause(&view.key).await.expect("pause again");
    let paused = h.manager.get(&view.key).await.expect("get");
    assert!(paused.paused);
    assert!(!paused.network_joined);
    assert_eq!(h.store.get(&view.key), Some(true));
    assert_eq!(handle.leave_calls(), 1);
    assert!(!handle.is_joined());

    h.manager.resume(&view.key).await.expect("resume");
    h.manager.resume(&view.key).await.expect("resume again");
    let resumed = h.manager.get(&view.key).await.expect("get");
    assert!(!resumed.paused);
    assert!(resumed.network_joined);
    assert_eq!(h.store.get(&view.key), Some(false));
    assert_eq!(handle.join_calls(), 2);
    assert!(handle.is_joined());
}

#[tokio::test]
async fn toggle_pause_follows_the_persisted_flag() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("t"), CreateOptions::default())
        .await
        .expect("create");

    h.manager.toggle_pause(&view.key).await.expect("toggle");
    assert!(h.manager.get(&view.key).await.expect("get").paused);
    h.manager.toggle_pause(&view.key).await.expect("toggle");
    let view = h.manager.get(&view.key).await.expect("get");
    assert!(!view.paused);
    assert!(view.network_joined);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_toggles_on_one_key_serialize() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("race"), CreateOptions::default())
        .await
        .expect("create");
    let handle = h.engine.handle(&view.key).expect("handle");
    h.store.set_delay(Some(Duration::from_millis(20)));

    let first = {
        let manager = h.manager.clone();
        let key = view.key;
        tokio::spawn(async move { manager.toggle_pause(&key).await })
    };
    let second = {
        let manager = h.manager.clone();
        let key = view.key;
        tokio::spawn(async move { manager.toggle_pause(&key).await })
    };
    first.await.expect("join").expect("first toggle");
    second.await.expect("join").expect("second toggle");

    let view = h.manager.get(&view.key).await.expect("get");
    assert!(!view.paused);
    assert!(view.network_joined);
    assert_eq!(h.store.get(&view.key), Some(false));
    assert_eq!(handle.leave_calls(), 1);
    assert_eq!(handle.join_calls(), 2);
}

#[tokio::test]
async fn close_removes_the_archive_and_clears_the_pause_flag() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("c"), CreateOptions::default())
        .await
        .expect("create");
    h.manager.pause(&view.key).await.expect("pause");

    h.manager.close(&view.key).await.expect("close");

    assert!(h.manager.list().await.expect("list").is_empty());
    assert_eq!(h.store.get(&view.key), Some(false));
    assert!(h.engine.handle(&view.key).is_none());
    assert!(matches!(
        h.manager.get(&view.key).await,
        Err(ManagerError::NotFound(_))
    ));
}

#[tokio::test]
async fn close_stops_when_the_pause_flag_cannot_be_written() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("s"), CreateOptions::default())
        .await
        .expect("create");
    h.store.fail_writes(true);

    let err = h.manager.close(&view.key).await.expect_err("store failure");
    assert!(matches!(err, ManagerError::Persistence(StoreError::Write { .. })));
    assert!(h.engine.handle(&view.key).is_some());
    assert_eq!(h.manager.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn close_failure_in_the_engine_keeps_the_entry() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("e"), CreateOptions::default())
        .await
        .expect("create");
    h.engine
        .fail_next_close(EngineError::Io("busy".into()));

    let err = h.manager.close(&view.key).await.expect_err("engine failure");
    assert!(matches!(err, ManagerError::Engine(EngineError::Io(_))));
    assert_eq!(h.manager.list().await.expect("list").len(), 1);
    assert_eq!(h.store.get(&view.key), Some(false));
}

#[tokio::test]
async fn unknown_keys_are_not_found() {
    let h = Harness::new().await;
    let key = remote_key(0x42);
    for result in [
        h.manager.pause(&key).await,
        h.manager.resume(&key).await,
        h.manager.toggle_pause(&key).await,
        h.manager.close(&key).await,
    ] {
        assert!(matches!(result, Err(ManagerError::NotFound(k)) if k == key));
    }
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn pause_reports_store_failures_after_leaving_the_swarm() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("f"), CreateOptions::default())
        .await
        .expect("create");
    h.store.fail_writes(true);

    let err = h.manager.pause(&view.key).await.expect_err("store failure");
    assert!(matches!(err, ManagerError::Persistence(_)));
    let view = h.manager.get(&view.key).await.expect("get");
    assert!(!view.network_joined);
    assert!(!view.paused);

    h.store.fail_writes(false);
    h.manager.pause(&view.key).await.expect("pause completes");
    let view = h.manager.get(&view.key).await.expect("get");
    assert!(view.paused && !view.network_joined);
}

#[tokio::test]
async fn restart_restores_persisted_pause_flags() {
    let engine = MemoryEngine::new();
    let paused = MemoryHandle::new(remote_key(1), "/tmp/restored-paused", false);
    let running = MemoryHandle::new(remote_key(2), "/tmp/restored-running", false);
    engine.insert(paused.clone());
    engine.insert(running.clone());
    let store = Arc::new(MemoryPauseStore::with_entries([(remote_key(1), true)]));

    let h = Harness::with(engine, store).await.expect("start");
    let archives = h.manager.list().await.expect("list");

    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0].key, remote_key(1));
    assert!(archives[0].paused && !archives[0].network_joined);
    assert!(!archives[1].paused && archives[1].network_joined);
    assert_eq!(paused.join_calls(), 0);
    assert!(running.is_joined());
    assert!(!h.updates.lock().expect("updates").is_empty());
}

#[tokio::test]
async fn restart_fails_when_pause_flags_are_unreadable() {
    let engine = MemoryEngine::new();
    engine.insert(MemoryHandle::new(remote_key(3), "/tmp/unreadable", false));
    let store = Arc::new(MemoryPauseStore::new());
    store.fail_reads(true);

    let dir = tempfile::tempdir().expect("tempdir");
    let result = support::start(engine, store, &dir).await;
    assert!(matches!(
        result.err(),
        Some(ManagerError::Persistence(StoreError::Read(_)))
    ));
}

#[tokio::test]
async fn initialization_errors_reach_the_observer() {
    let h = Harness::new().await;
    h.store.fail_reads(true);

    let err = h
        .manager
        .create(h.path("bad-store"), CreateOptions::default())
        .await
        .expect_err("store read failure");
    assert!(matches!(err, ManagerError::Persistence(_)));
    assert!(h.manager.list().await.expect("list").is_empty());
    assert!(h.engine.is_empty());
    assert!(h
        .errors()
        .iter()
        .any(|err| matches!(err, ManagerError::Persistence(_))));
}

#[tokio::test]
async fn failed_setup_closes_the_engine_archive_so_create_can_be_retried() {
    let h = Harness::new().await;
    let dir = h.path("retry");
    let key = key_for_path(&dir);
    h.store.fail_reads(true);

    let err = h
        .manager
        .create(&dir, CreateOptions::default())
        .await
        .expect_err("store read failure");
    assert!(matches!(err, ManagerError::Persistence(StoreError::Read(_))));
    assert!(h.engine.handle(&key).is_none());
    assert!(matches!(
        h.manager.close(&key).await,
        Err(ManagerError::NotFound(_))
    ));

    h.store.fail_reads(false);
    let view = h
        .manager
        .create(&dir, CreateOptions::default())
        .await
        .expect("retried create");
    assert_eq!(view.key, key);
    assert!(view.network_joined);
    assert_eq!(h.manager.list().await.expect("list").len(), 1);
    h.manager.close(&key).await.expect("close");
    assert!(h.engine.is_empty());
}

#[tokio::test]
async fn setup_failure_is_returned_even_when_cleanup_fails() {
    let h = Harness::new().await;
    let dir = h.path("stuck");
    h.store.fail_reads(true);
    h.engine.fail_next_close(EngineError::Io("busy".into()));

    let err = h
        .manager
        .create(&dir, CreateOptions::default())
        .await
        .expect_err("store read failure");
    assert!(matches!(err, ManagerError::Persistence(_)));
    assert!(h.manager.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn download_links_land_in_the_downloads_directory() {
    let h = Harness::new().await;
    let key = remote_key(0xab);

    let view = h
        .manager
        .download(&format!(" hive://{}/ ", key.to_hex()))
        .await
        .expect("download");
    assert_eq!(view.key, key);
    assert!(!view.writable);
    assert_eq!(
        view.path,
        h.manager.config().downloads_dir.join(key.to_hex())
    );
    let handle = h.engine.handle(&key).expect("handle");
    assert!(!handle.is_importing());

    let err = h
        .manager
        .download(&key.to_hex())
        .await
        .expect_err("duplicate");
    assert!(err.is_warning());

    let err = h
        .manager
        .download("https://example.com/not-an-archive")
        .await
        .expect_err("invalid link");
    assert!(matches!(err, ManagerError::Validation(_)));
}

#[tokio::test]
async fn manifest_metadata_arrives_asynchronously() {
    let h = Harness::new().await;
    let view = h
        .manager
        .create(h.path("Holiday Photos"), CreateOptions::default())
        .await
        .expect("create");

    let archives = h
        .eventually(|archives| archives[0].metadata.is_some())
        .await;
    assert_eq!(archives[0].title(), Some("Holiday Photos"));
    assert_eq!(view.key, archives[0].key);
}

#[tokio::test]
async fn unreadable_manifests_leave_metadata_absent() {
    let engine = MemoryEngine::new();
    let handle = MemoryHandle::new(remote_key(7), "/tmp/no-manifest", false);
    handle.fail_manifest_reads(true);
    engine.insert(handle.clone());
    let h = Harness::with(engine, Arc::new(MemoryPauseStore::new()))
        .await
        .expect("start");

    handle.mark_ready();
    let archives = h.eventually(|archives| archives.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(archives[0].metadata.is_none());
    assert!(h.manager.list().await.expect("list")[0].metadata.is_none());
    assert!(h.errors().is_empty());

    handle.fail_manifest_reads(false);
    handle.set_manifest(Manifest {
        title: Some("late".into()),
        ..Manifest::default()
    });
    assert!(h.manager.list().await.expect("list")[0].metadata.is_none());
}

#[tokio::test]
async fn lifecycle_transitions_are_published_on_the_bus() {
    let bus = Bus::new(16);
    let mut rx = bus.subscribe();
    let engine = MemoryEngine::new();
    let store: Arc<dyn PauseStore> = Arc::new(MemoryPauseStore::new());
    let dir = tempfile::tempdir().expect("tempdir");

    let manager = ArchiveManager::builder(engine, store)
        .bus(bus.clone())
        .start()
        .await
        .expect("start");
    let view = manager
        .create(dir.path().join("bus"), CreateOptions::default())
        .await
        .expect("create");

    let env = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(env.kind, TOPIC_ARCHIVE_CREATED);
    assert_eq!(env.payload["key"], view.key.to_hex());

    manager.shutdown().await;
    assert!(matches!(manager.list().await, Err(ManagerError::Stopped)));
}
