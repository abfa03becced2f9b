//! Shared archive types and the collaborator contracts the manager drives.
//!
//! The swarm engine, the pause-flag store and the outward notification sinks
//! all live behind the traits re-exported here so the manager can be wired to
//! a real replication stack or to the in-memory doubles used in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod engine;
pub mod sink;
pub mod store;

pub use engine::{ArchiveEngine, ArchiveEvent, ArchiveHandle, Created, EngineError, SharedHandle};
pub use sink::{Discard, Notifier, ProgressSink};
pub use store::{PauseStore, StoreError};

pub const KEY_LEN: usize = 32;

/// Link schemes accepted by [`ArchiveKey::parse_link`].
pub const LINK_SCHEMES: &[&str] = &["hive", "dat"];

/// Aggregate progress value meaning "nothing in flight".
pub const PROGRESS_IDLE: f64 = -1.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("link is empty")]
    Empty,
    #[error("unsupported link scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("expected {expected} hex characters, found {found}", expected = KEY_LEN * 2)]
    Length { found: usize },
    #[error("key is not valid hex")]
    InvalidHex,
}

/// Content address of an archive. Renders as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveKey([u8; KEY_LEN]);

impl ArchiveKey {
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_link(&self) -> String {
        format!("{}://{}", LINK_SCHEMES[0], self.to_hex())
    }

    /// Parses a share link (`hive://<hex>`, `dat://<hex>`) or a bare hex key.
    ///
    /// Surrounding whitespace, trailing slashes and any path after the key are
    /// ignored.
    pub fn parse_link(link: &str) -> Result<Self, KeyParseError> {
        let trimmed = link.trim();
        if trimmed.is_empty() {
            return Err(KeyParseError::Empty);
        }
        let rest = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if !LINK_SCHEMES.contains(&scheme.as_str()) {
                    return Err(KeyParseError::UnsupportedScheme(scheme));
                }
                rest
            }
            None => trimmed,
        };
        let raw = rest.split('/').next().unwrap_or_default();
        if raw.is_empty() {
            return Err(KeyParseError::Empty);
        }
        if raw.len() != KEY_LEN * 2 {
            return Err(KeyParseError::Length { found: raw.len() });
        }
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(raw, &mut bytes).map_err(|_| KeyParseError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl FromStr for ArchiveKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_link(s)
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchiveKey({})", &self.to_hex()[..8])
    }
}

impl Serialize for ArchiveKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ArchiveKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Replication counters reported by the engine for one archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub downloaded: u64,
    pub length: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Small metadata document stored alongside an archive's content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Manifest {
    /// Manifest written when an archive is first created at `path`.
    pub fn for_new_archive(key: &ArchiveKey, path: &Path, writable: bool) -> Self {
        let title = if writable {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        } else {
            None
        };
        Self {
            title,
            author: None,
            url: Some(key.to_link()),
        }
    }

    pub fn metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
        }
    }
}

/// Options passed to [`ArchiveEngine::create`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Remote key to replicate; `None` creates a new writable archive.
    pub key: Option<ArchiveKey>,
    pub watch: bool,
    pub resume: bool,
    pub ignore_hidden: bool,
    pub compare_file_content: bool,
}

impl CreateOptions {
    pub fn download(key: ArchiveKey) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    /// Applies the policy every managed archive runs with. Caller-supplied
    /// flags are overridden.
    pub fn with_managed_policy(mut self) -> Self {
        self.watch = true;
        self.resume = true;
        self.ignore_hidden = true;
        self.compare_file_content = true;
        self
    }
}

/// Read-only view of one managed archive, as handed to observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveView {
    pub key: ArchiveKey,
    pub path: PathBuf,
    pub writable: bool,
    pub network_joined: bool,
    pub paused: bool,
    pub progress: f64,
    #[serde(default)]
    pub metadata: Option<ArchiveMetadata>,
    pub connections: usize,
}

impl ArchiveView {
    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|meta| meta.title.as_deref())
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Payload of a "download finished" notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub key: ArchiveKey,
    pub title: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Completion {
    pub fn new(key: ArchiveKey, title: Option<&str>, path: &Path) -> Self {
        let title = title
            .filter(|title| !title.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| key.to_hex());
        let location = std::path::absolute(path)
            .ok()
            .and_then(|abs| url::Url::from_file_path(abs).ok())
            .map(|url| url.to_string());
        Self {
            key,
            title,
            path: path.to_path_buf(),
            location,
        }
    }
}
