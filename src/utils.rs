//! Filesystem and URL helpers shared by the scraper

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Derive the stored file name from an asset URL: its final path segment.
///
/// Query strings and fragments are ignored. Returns `None` when the URL has
/// no usable final segment (e.g. it ends with `/`).
///
/// # Examples
///
/// ```
/// use instagram_scraper::utils::file_name_from_url;
///
/// assert_eq!(
///     file_name_from_url("https://cdn.example.com/t51/photo1.jpg?ig_cache=1"),
///     Some("photo1.jpg".to_string())
/// );
/// assert_eq!(file_name_from_url("https://cdn.example.com/dir/"), None);
/// ```
pub fn file_name_from_url(url: &str) -> Option<String> {
    if let Ok(parsed) = url::Url::parse(url)
        && let Some(mut segments) = parsed.path_segments()
    {
        return segments
            .next_back()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    // Not an absolute URL: fall back to plain string splitting
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Create `dir` (and parents) if it does not exist yet.
///
/// Fails when the path exists but is not a directory.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create directory '{}': {}", dir.display(), e),
        ))
    })
}

/// Convert a unix timestamp into a `SystemTime`, clamping out-of-range values to the epoch.
pub fn system_time_from_unix(secs: i64) -> SystemTime {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(SystemTime::from)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Current wall-clock time as a unix timestamp
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Set both the modification and access time of `path` to `secs`.
pub fn set_file_times(path: &Path, secs: i64) -> std::io::Result<()> {
    let time = system_time_from_unix(secs);
    let times = std::fs::FileTimes::new()
        .set_accessed(time)
        .set_modified(time);
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)?
        .set_times(times)
}

/// Resolve the directory a target's assets go to.
///
/// - no destination configured: `./<name>`
/// - `retain_username`: `<destination>/<name>`
/// - otherwise: `<destination>`
pub fn destination_for(destination: Option<&Path>, retain_username: bool, name: &str) -> PathBuf {
    match destination {
        None => PathBuf::from(".").join(name),
        Some(root) if retain_username => root.join(name),
        Some(root) => root.to_path_buf(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_name_strips_query_and_fragment() {
        assert_eq!(
            file_name_from_url("https://x.cdninstagram.com/a/b/video.mp4?x=1#t=2").as_deref(),
            Some("video.mp4")
        );
    }

    #[test]
    fn file_name_falls_back_for_relative_paths() {
        assert_eq!(
            file_name_from_url("photos/photo2.jpg?x=1").as_deref(),
            Some("photo2.jpg")
        );
        assert_eq!(file_name_from_url("photos/"), None);
        assert_eq!(file_name_from_url(""), None);
    }

    #[test]
    fn destination_policy() {
        assert_eq!(
            destination_for(None, false, "alice"),
            PathBuf::from("./alice")
        );
        assert_eq!(
            destination_for(Some(Path::new("/data")), true, "alice"),
            PathBuf::from("/data/alice")
        );
        assert_eq!(
            destination_for(Some(Path::new("/data")), false, "alice"),
            PathBuf::from("/data")
        );
    }

    #[test]
    fn system_time_round_trips_whole_seconds() {
        let t = system_time_from_unix(1_485_118_406);
        let secs = t.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 1_485_118_406);
    }

    #[test]
    fn set_file_times_updates_mtime_and_atime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"bytes").unwrap();

        set_file_times(&path, 1_400_000_000).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let mtime = meta
            .modified()
            .unwrap()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let atime = meta
            .accessed()
            .unwrap()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(mtime, 1_400_000_000);
        assert_eq!(atime, 1_400_000_000);
    }

    #[tokio::test]
    async fn ensure_dir_fails_when_path_is_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_dir(&file).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
