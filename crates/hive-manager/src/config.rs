use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_DOWNLOADS_DIR: Lazy<PathBuf> = Lazy::new(|| {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|dir| dir.join("hive")))
        .unwrap_or_else(|| PathBuf::from("downloads"))
});

const DEFAULT_COALESCE_LIMIT: usize = 64;
const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Parent directory for archives fetched through share links.
    pub downloads_dir: PathBuf,
    /// Queued messages the manager applies before recomputing progress once.
    pub coalesce_limit: usize,
    /// Capacity of the event bus front ends create for the manager.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            downloads_dir: DEFAULT_DOWNLOADS_DIR.clone(),
            coalesce_limit: DEFAULT_COALESCE_LIMIT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: ManagerConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overlaid with `HIVE_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies `HIVE_DOWNLOADS_DIR`, `HIVE_COALESCE_LIMIT` and
    /// `HIVE_EVENT_CAPACITY` on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(dir) = env_value("HIVE_DOWNLOADS_DIR") {
            self.downloads_dir = PathBuf::from(dir);
        }
        if let Some(raw) = env_value("HIVE_COALESCE_LIMIT") {
            self.coalesce_limit = parse_env("HIVE_COALESCE_LIMIT", &raw)?;
        }
        if let Some(raw) = env_value("HIVE_EVENT_CAPACITY") {
            self.event_capacity = parse_env("HIVE_EVENT_CAPACITY", &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.downloads_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("downloads_dir must not be empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.parse::<usize>()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative integer")))
}
