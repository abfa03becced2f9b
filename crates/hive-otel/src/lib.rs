//! Process-wide `tracing` setup shared by the hive binaries.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const DEFAULT_FILE_FILTER: &str = "hive=debug,info";

/// Installs the global subscriber: stderr output filtered by `RUST_LOG`
/// (default `info`), plus a rolling log file when `HIVE_LOG_ROLL=1`.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`] but with an explicit default directive, used by front ends
/// that expose a `--verbose` switch.
pub fn init_with_default(directive: &str) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);
    let registry = tracing_subscriber::registry().with(console);

    let Some(settings) = FileLogSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };
    let appender = std::fs::create_dir_all(&settings.dir)
        .map_err(|err| err.to_string())
        .and_then(|()| {
            RollingFileAppender::builder()
                .rotation(settings.rotation.clone())
                .filename_prefix(&settings.prefix)
                .build(&settings.dir)
                .map_err(|err| err.to_string())
        });
    let appender = match appender {
        Ok(appender) => appender,
        Err(err) => {
            let _ = registry.try_init();
            tracing::warn!(
                directory = %settings.dir.display(),
                error = %err,
                "log directory unavailable; file logging disabled"
            );
            return;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    let file_filter = EnvFilter::try_from_env("HIVE_LOG_FILE_FILTER")
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_FILTER));
    let file = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(file_filter);
    let _ = registry.with(file).try_init();
}

/// Rolling file output, enabled with `HIVE_LOG_ROLL=1`.
#[derive(Debug, PartialEq)]
struct FileLogSettings {
    dir: PathBuf,
    prefix: String,
    rotation: Rotation,
}

impl FileLogSettings {
    fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if lookup("HIVE_LOG_ROLL").as_deref().map(str::trim) != Some("1") {
            return None;
        }
        let rotation = match lookup("HIVE_LOG_ROTATION")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "hourly" => Rotation::HOURLY,
            "minutely" => Rotation::MINUTELY,
            "never" => Rotation::NEVER,
            _ => Rotation::DAILY,
        };
        Some(Self {
            dir: lookup("HIVE_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            prefix: lookup("HIVE_LOG_PREFIX").unwrap_or_else(|| "hive".into()),
            rotation,
        })
    }
}
