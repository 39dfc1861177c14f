//! # instagram-scraper
//!
//! Library for mirroring Instagram users, hashtags and locations into local
//! directories.
//!
//! ## Pipeline
//!
//! For every configured target the scraper:
//! - walks the target's cursor-paginated listing lazily ([`source::MediaStream`])
//! - reduces each record to downloadable assets ([`resolver::resolve`])
//! - optionally stops at media already present on disk ([`high_water`])
//! - downloads assets in a bounded worker pool, skipping files that already
//!   exist and stamping each file with the media's creation time
//!
//! A failing target never stops the others; every run ends with a
//! [`ScrapeSummary`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use instagram_scraper::{Config, InstagramScraper, OutputConfig, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         targets: vec![
//!             Target::User("alice".to_string()),
//!             Target::Hashtag("sunset".to_string()),
//!         ],
//!         output: OutputConfig {
//!             destination: Some("downloads".into()),
//!             retain_username: true,
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let scraper = InstagramScraper::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = scraper.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = scraper.scrape().await;
//!     println!("{} downloaded, {} failed", summary.downloaded(), summary.failed());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP client for the web and mobile endpoints
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Incremental ("latest only") filtering
pub mod high_water;
/// Raw records to downloadable assets
pub mod resolver;
/// Retry logic with backoff
pub mod retry;
/// Scrape coordinator, downloader and worker pool
pub mod scraper;
/// Lazy paginated listings
pub mod source;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::InstagramClient;
pub use config::{Config, Credentials, MediaConfig, NetworkConfig, OutputConfig, RetryConfig};
pub use error::{Error, Result};
pub use scraper::{AssetTransport, Downloader, InstagramScraper};
pub use source::{MediaStream, PageFetcher};
pub use types::{
    Asset, DownloadOutcome, Event, MediaKind, OutcomeStatus, ScrapeSummary, Target, TargetPhase,
    TargetReport, TargetStatus,
};

/// Run a scrape, cancelling it gracefully on a termination signal.
///
/// On the first signal pagination stops, downloads already in flight are
/// allowed to finish, and the partial summary is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use instagram_scraper::{Config, InstagramScraper, Target, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config {
///         targets: vec![Target::User("alice".to_string())],
///         ..Default::default()
///     };
///     let scraper = InstagramScraper::new(config).await?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(scraper).await;
///     println!("{} files downloaded", summary.downloaded());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(scraper: InstagramScraper) -> ScrapeSummary {
    let watcher = {
        let scraper = scraper.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            scraper.cancel();
        })
    };

    let summary = scraper.scrape().await;
    watcher.abort();
    summary
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, some CI sandboxes)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut term), Ok(mut int)) => {
            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "Stopping scrape");
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Listening for one termination signal only");
            only.recv().await;
            tracing::info!("Stopping scrape");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "No signal handlers, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Stopping scrape");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, stopping scrape"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
