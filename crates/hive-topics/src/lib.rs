//! Canonical event topic constants shared by the manager and its front ends.
//!
//! Keep this list alphabetized within sections and favor dot.case names.

// Archive lifecycle
pub const TOPIC_ARCHIVE_CLOSED: &str = "archives.closed";
pub const TOPIC_ARCHIVE_CREATED: &str = "archives.created";
pub const TOPIC_ARCHIVE_PAUSED: &str = "archives.paused";
pub const TOPIC_ARCHIVE_RESUMED: &str = "archives.resumed";

// Replication progress
pub const TOPIC_DOWNLOAD_COMPLETED: &str = "archives.download.completed";
pub const TOPIC_PROGRESS: &str = "archives.progress";

// Observer snapshots
pub const TOPIC_ARCHIVES_ERROR: &str = "archives.error";
pub const TOPIC_ARCHIVES_UPDATED: &str = "archives.updated";

/// Every topic above, for front ends that subscribe to the whole family.
pub const ALL_TOPICS: &[&str] = &[
    TOPIC_ARCHIVE_CLOSED,
    TOPIC_ARCHIVE_CREATED,
    TOPIC_ARCHIVE_PAUSED,
    TOPIC_ARCHIVE_RESUMED,
    TOPIC_DOWNLOAD_COMPLETED,
    TOPIC_PROGRESS,
    TOPIC_ARCHIVES_ERROR,
    TOPIC_ARCHIVES_UPDATED,
];
