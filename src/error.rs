//! Error types for instagram-scraper
//!
//! A single [`Error`] enum covers every failure the scrape pipeline can hit.
//! Variants fall into three groups:
//! - target-fatal: the current target is abandoned, other targets continue
//!   ([`Error::is_target_fatal`])
//! - transient: recovered locally by one retry in the downloader
//!   ([`crate::retry::IsRetryable`])
//! - per-record / per-asset: logged, counted in the run summary, never fatal

use thiserror::Error;

/// Result type alias for instagram-scraper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for instagram-scraper
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// The remote service reports that the target does not exist
    #[error("target {0} does not exist")]
    TargetNotFound(String),

    /// The first listing page was empty: the target is private or has no media
    #[error("target {0} is private or has no media")]
    TargetPrivateOrEmpty(String),

    /// Login was rejected
    #[error("login failed for {0}")]
    AuthenticationFailed(String),

    /// Transient connection-level failure (refused, reset, timed out)
    #[error("connection error: {0}")]
    Connection(String),

    /// A record could not be reduced to any downloadable asset
    #[error("could not resolve record {record}: {reason}")]
    ResolutionFailed {
        /// Identifier (id or shortcode) of the record
        record: String,
        /// Why resolution failed
        reason: String,
    },

    /// The server answered with a status the caller cannot handle
    #[error("unexpected HTTP status {status} for {url}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A response body did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error aborts the pipeline of the target it occurred in.
    ///
    /// Fatal errors never abort the whole process: the coordinator records the
    /// failure on the target's report and moves on to the next target.
    pub fn is_target_fatal(&self) -> bool {
        matches!(
            self,
            Error::TargetNotFound(_)
                | Error::TargetPrivateOrEmpty(_)
                | Error::AuthenticationFailed(_)
        )
    }

    /// Build a [`Error::Config`] for the given key.
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Classify a reqwest error: connect/timeout faults become [`Error::Connection`].
    pub(crate) fn from_request(url: &str, e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::Connection(format!("{url}: {e}"))
        } else {
            Error::Network(e)
        }
    }
}
