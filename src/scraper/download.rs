//! Idempotent single-asset download with one anonymous retry.

use crate::client::{InstagramClient, check_status};
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{Asset, DownloadOutcome, OutcomeStatus};
use crate::utils;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Abstraction over fetching asset bytes, enabling testability.
#[async_trait]
pub trait AssetTransport: Send + Sync {
    /// Fetch the body of `url`, through the logged-in session when `authenticated`
    ///
    /// Connection-level faults must surface as [`Error::Connection`] so the
    /// downloader can retry them.
    async fn get_bytes(&self, url: &str, authenticated: bool) -> Result<Vec<u8>>;
}

/// Production [`AssetTransport`] backed by the client's HTTP sessions.
pub struct ReqwestTransport {
    session: reqwest::Client,
    anonymous: reqwest::Client,
}

impl ReqwestTransport {
    /// Share the session and anonymous clients of `client`
    pub fn new(client: &InstagramClient) -> Self {
        Self {
            session: client.http().clone(),
            anonymous: client.anonymous().clone(),
        }
    }
}

#[async_trait]
impl AssetTransport for ReqwestTransport {
    async fn get_bytes(&self, url: &str, authenticated: bool) -> Result<Vec<u8>> {
        let client = if authenticated {
            &self.session
        } else {
            &self.anonymous
        };
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_request(url, e))?;
        check_status(response.status(), url, None)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_request(url, e))?;
        Ok(body.to_vec())
    }
}

/// Fetches assets into a directory
pub struct Downloader {
    transport: Arc<dyn AssetTransport>,
    retry: RetryConfig,
    quiet: bool,
}

impl Downloader {
    /// Create a downloader over `transport`
    pub fn new(transport: Arc<dyn AssetTransport>, retry: RetryConfig, quiet: bool) -> Self {
        Self {
            transport,
            retry,
            quiet,
        }
    }

    /// Store `asset` in `dir` under its URL's final path segment.
    ///
    /// An existing file makes this a no-op. The body is written to a hidden
    /// `.part` file and renamed into place once its times are set, so a file
    /// under the final name is always complete. The existence check and the
    /// rename are not atomic: two concurrent calls for the same name may both
    /// fetch, and the later rename wins.
    ///
    /// The first attempt goes through the logged-in session; after a
    /// connection failure and the configured pause, the retry is anonymous.
    /// On success the file's mtime and atime are set to `asset.created_at`.
    pub async fn fetch_and_store(&self, asset: &Asset, dir: &Path) -> DownloadOutcome {
        let Some(file_name) = asset.file_name() else {
            return self.failed(asset, 0, Error::Other(format!("no file name in {}", asset.url)));
        };
        let file_path = dir.join(&file_name);

        if tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
            tracing::debug!(file = %file_path.display(), "Already downloaded, skipping");
            return DownloadOutcome {
                asset: asset.clone(),
                status: OutcomeStatus::Skipped,
                error: None,
                attempts: 0,
            };
        }

        let calls = AtomicU32::new(0);
        let fetched = with_retry(&self.retry, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            let transport = Arc::clone(&self.transport);
            let url = asset.url.clone();
            async move { transport.get_bytes(&url, attempt == 0).await }
        })
        .await;
        let attempts = calls.load(Ordering::SeqCst);

        let body = match fetched {
            Ok((body, _)) => body,
            Err(e) => return self.failed(asset, attempts, e),
        };

        if let Err(e) = store(&file_path, &body, asset.created_at).await {
            return self.failed(asset, attempts, e);
        }

        if self.quiet {
            tracing::debug!(file = %file_path.display(), bytes = body.len(), "Downloaded");
        } else {
            tracing::info!(file = %file_path.display(), bytes = body.len(), "Downloaded");
        }
        DownloadOutcome {
            asset: asset.clone(),
            status: OutcomeStatus::Downloaded,
            error: None,
            attempts,
        }
    }

    fn failed(&self, asset: &Asset, attempts: u32, error: Error) -> DownloadOutcome {
        tracing::warn!(url = %asset.url, attempts, error = %error, "Download failed");
        DownloadOutcome {
            asset: asset.clone(),
            status: OutcomeStatus::Failed,
            error: Some(error.to_string()),
            attempts,
        }
    }
}

/// Write `body` under a hidden partial name, stamp it, then move it to `path`.
///
/// On failure the partial file is removed and nothing exists at `path`.
async fn store(path: &Path, body: &[u8], created_at: i64) -> Result<()> {
    let partial = partial_path(path);
    let stored = match write_stamped(&partial, body, created_at).await {
        Ok(()) => tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| io_error("move into place", path, e)),
        Err(e) => Err(e),
    };
    if stored.is_err() {
        tokio::fs::remove_file(&partial).await.ok();
    }
    stored
}

async fn write_stamped(path: &Path, body: &[u8], created_at: i64) -> Result<()> {
    tokio::fs::write(path, body)
        .await
        .map_err(|e| io_error("write", path, e))?;

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || utils::set_file_times(&path, created_at))
        .await
        .map_err(|e| Error::Other(format!("file time task failed: {e}")))??;
    Ok(())
}

/// `dir/photo.jpg` becomes `dir/.photo.jpg.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".part");
    path.with_file_name(name)
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("Failed to {action} '{}': {e}", path.display()),
    ))
}
