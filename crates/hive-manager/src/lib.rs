//! Archive lifecycle and swarm progress manager.
//!
//! [`ArchiveManager`] keeps the registry of replicated archives, serializes
//! create/close/pause/resume per archive key, folds the engine's stats into a
//! single swarm-wide progress value and reports every change to an
//! [`UpdateObserver`].
//!
//! ```no_run
//! # async fn demo(
//! #     engine: std::sync::Arc<dyn hive_archive::ArchiveEngine>,
//! #     store: std::sync::Arc<dyn hive_archive::PauseStore>,
//! # ) -> Result<(), hive_manager::ManagerError> {
//! use hive_archive::CreateOptions;
//! use hive_manager::ArchiveManager;
//!
//! let manager = ArchiveManager::builder(engine, store)
//!     .on_update(|err, archives| {
//!         if let Some(err) = err {
//!             eprintln!("archive error: {err}");
//!         }
//!         println!("{} archives", archives.len());
//!     })
//!     .start()
//!     .await?;
//! let view = manager.create("/tmp/photos", CreateOptions::default()).await?;
//! manager.toggle_pause(&view.key).await?;
//! # Ok(())
//! # }
//! ```

mod actor;
mod config;
mod error;
mod keyed;
mod manager;
mod observer;
pub mod progress;
mod registry;

pub use config::{ConfigError, ManagerConfig};
pub use error::{ErrorReport, ManagerError};
pub use manager::{ArchiveManager, ManagerBuilder};
pub use observer::{BusNotifier, BusObserver, BusProgressSink, UpdateObserver};
