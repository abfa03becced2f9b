//! Progress derivation and swarm-wide aggregation.

use hive_archive::{ArchiveStats, PROGRESS_IDLE};

/// Fraction of an archive present locally.
///
/// No stats yet reads as `0`; an originator is complete by definition once
/// the engine reports stats for it.
pub fn archive_progress(stats: Option<ArchiveStats>, writable: bool) -> f64 {
    match stats {
        None => 0.0,
        Some(_) if writable => 1.0,
        Some(stats) if stats.length == 0 => 0.0,
        Some(stats) => (stats.downloaded as f64 / stats.length as f64).min(1.0),
    }
}

/// True when an archive that was mid-download has just finished.
pub fn finished_downloading(previous: f64, current: f64) -> bool {
    previous > 0.0 && previous < 1.0 && current >= 1.0
}

/// Mean progress over joined, incomplete archives, or [`PROGRESS_IDLE`]
/// when none are in flight.
pub fn aggregate<I>(archives: I) -> f64
where
    I: IntoIterator<Item = (bool, f64)>,
{
    let (count, sum) = archives
        .into_iter()
        .filter(|(joined, progress)| *joined && *progress < 1.0)
        .fold((0usize, 0.0f64), |(count, sum), (_, progress)| {
            (count + 1, sum + progress)
        });
    if count == 0 {
        PROGRESS_IDLE
    } else {
        sum / count as f64
    }
}
