pub mod config;
pub mod link;
pub mod simulate;

pub use config::ConfigArgs;
pub use link::LinkArgs;
pub use simulate::SimulateArgs;

use std::path::PathBuf;

use anyhow::{Context, Result};
use hive_manager::ManagerConfig;

/// Loads the manager config from `path` (or defaults) and applies the
/// `HIVE_*` environment overrides.
pub fn load_config(path: Option<&PathBuf>) -> Result<ManagerConfig> {
    let base = match path {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ManagerConfig::default(),
    };
    base.with_env_overrides()
        .context("applying HIVE_* environment overrides")
}
