//! Incremental ("only new since last run") filtering.
//!
//! The mark is the newest mtime among files already in the destination
//! directory; downloaded files carry their media's creation time as mtime, so
//! anything not newer than the mark was fetched by an earlier run.

use crate::types::HighWaterMark;
use std::path::Path;
use std::time::SystemTime;

/// Whether a record with the given timestamp counts as new.
///
/// Always true when incremental mode is off, when no prior run was detected,
/// or when the record has no timestamp.
pub fn is_new(record_timestamp: Option<i64>, mark: HighWaterMark, incremental: bool) -> bool {
    if !incremental || !mark.is_set() {
        return true;
    }
    match record_timestamp {
        Some(ts) => ts > mark.0,
        None => true,
    }
}

/// Compute the mark from `dir`: max mtime over files whose extension is in `extensions`.
///
/// A missing directory, or one without matching files, yields [`HighWaterMark::UNSET`].
/// Extension matching is case-insensitive.
pub async fn scan(dir: &Path, extensions: &[String]) -> std::io::Result<HighWaterMark> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HighWaterMark::UNSET),
        Err(e) => return Err(e),
    };

    let mut newest = HighWaterMark::UNSET;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if !matches {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let mtime = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        newest = newest.max(HighWaterMark(mtime));
    }

    tracing::debug!(dir = %dir.display(), mark = newest.0, "Computed high-water mark");
    Ok(newest)
}
