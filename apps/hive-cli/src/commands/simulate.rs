use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::Args;
use hive_archive::{ArchiveKey, CreateOptions, KEY_LEN};
use hive_events::Bus;
use hive_manager::{ArchiveManager, BusNotifier, BusObserver, BusProgressSink};
use hive_mock_engine::{MemoryEngine, MemoryPauseStore};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Args)]
pub struct SimulateArgs {
    /// TOML config file; defaults apply when omitted
    #[arg(long, env = "HIVE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Remote archives to download
    #[arg(long, default_value_t = 2)]
    pub archives: u8,
    /// Stats updates each download goes through
    #[arg(long, default_value_t = 4)]
    pub chunks: u64,
    /// Bytes in every simulated archive
    #[arg(long, default_value_t = 1 << 20)]
    pub size: u64,
    /// Delay between steps, in milliseconds
    #[arg(long, default_value_t = 10)]
    pub interval_ms: u64,
    /// Directory for archive folders; a temporary one when omitted
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Pause the first download halfway through and resume it a step later
    #[arg(long)]
    pub pause: bool,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(simulate(args))
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    ensure!(args.chunks > 0, "--chunks must be at least 1");
    ensure!(args.size > 0, "--size must be at least 1");

    let scratch = match args.root {
        Some(_) => None,
        None => Some(tempfile::tempdir().context("creating scratch directory")?),
    };
    let root = match (&args.root, &scratch) {
        (Some(root), _) => root.clone(),
        (None, Some(dir)) => dir.path().to_path_buf(),
        (None, None) => bail!("no simulation root available"),
    };

    let mut config = super::load_config(args.config.as_ref())?;
    config.downloads_dir = root.join("downloads");

    let bus = Bus::new(config.event_capacity);
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            match events.recv().await {
                Ok(env) => {
                    println!("{}", serde_json::to_string(&env)?);
                    printed += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "hive::cli", skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        Ok::<usize, anyhow::Error>(printed)
    });

    let engine = MemoryEngine::new();
    let manager = ArchiveManager::builder(engine.clone(), Arc::new(MemoryPauseStore::new()))
        .observer(BusObserver::new(bus.clone()))
        .notifier(BusNotifier::new(bus.clone()))
        .progress_sink(BusProgressSink::new(bus.clone()))
        .bus(bus.clone())
        .config(config)
        .start()
        .await
        .context("starting archive manager")?;

    let local = manager
        .create(root.join("local"), CreateOptions::default())
        .await
        .context("creating local archive")?;
    engine
        .handle(&local.key)
        .context("local archive missing from engine")?
        .set_stats(args.size, args.size);

    let mut keys = Vec::with_capacity(usize::from(args.archives));
    for n in 0..args.archives {
        let key = ArchiveKey::from_bytes([n.wrapping_add(1); KEY_LEN]);
        let view = manager
            .download(&key.to_link())
            .await
            .with_context(|| format!("downloading {}", key.to_link()))?;
        keys.push(view.key);
    }

    let halfway = (args.chunks + 1) / 2;
    for step in 1..=args.chunks {
        for (idx, key) in keys.iter().enumerate() {
            if args.pause && idx == 0 && step == halfway {
                manager.pause(key).await.context("pausing download")?;
            }
            if args.pause && idx == 0 && step == halfway + 1 {
                manager.resume(key).await.context("resuming download")?;
            }
            let handle = engine
                .handle(key)
                .context("download missing from engine")?;
            if step == 1 {
                handle.open_connection();
            }
            let downloaded = args.size * step / args.chunks;
            handle.set_stats(downloaded, args.size);
            let expected = downloaded as f64 / args.size as f64;
            wait_for_progress(&manager, key, expected).await?;
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    manager
        .close(&local.key)
        .await
        .context("closing local archive")?;
    manager.shutdown().await;
    drop(manager);
    drop(bus);

    let printed = printer.await.context("event printer stopped unexpectedly")??;
    info!(target: "hive::cli", printed, downloads = keys.len(), "simulation finished");
    Ok(())
}

/// Blocks until the manager has folded the latest stats for `key` in, so
/// every step is observed before the next one lands.
async fn wait_for_progress(manager: &ArchiveManager, key: &ArchiveKey, expected: f64) -> Result<()> {
    let wait = async {
        loop {
            let view = manager.get(key).await?;
            if (view.progress - expected).abs() < 1e-9 {
                return Ok::<(), anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .with_context(|| format!("archive {key} never reached progress {expected}"))?
}
