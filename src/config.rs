//! Configuration types for instagram-scraper

use crate::error::{Error, Result};
use crate::types::{MediaKind, Target};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::PathBuf, time::Duration};

/// Where and how assets are stored
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination root (default: none, meaning `./<target>`)
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Store each target in its own subdirectory of `destination`
    #[serde(default)]
    pub retain_username: bool,

    /// Write `<target>.json` with the metadata of every downloaded record
    #[serde(default)]
    pub media_metadata: bool,

    /// Only fetch media newer than the newest file already in the destination
    #[serde(default)]
    pub latest: bool,

    /// File extensions considered when computing the high-water mark (default: jpg, mp4)
    #[serde(default = "default_latest_extensions")]
    pub latest_extensions: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            destination: None,
            retain_username: false,
            media_metadata: false,
            latest: false,
            latest_extensions: default_latest_extensions(),
        }
    }
}

/// Which media to collect
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Media types to download (default: image, video, story)
    ///
    /// Add [`MediaKind::ProfilePic`] to also fetch the target's profile picture.
    #[serde(default = "default_media_types")]
    pub media_types: BTreeSet<MediaKind>,

    /// Maximum number of listing records per target (0 = unbounded)
    #[serde(default)]
    pub maximum: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_types: default_media_types(),
            maximum: 0,
        }
    }
}

/// Remote endpoints
///
/// Both bases must end with `/`. Overridable so tests can point the client at
/// a local mock server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoints {
    /// Web base URL (default: "https://www.instagram.com/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Mobile API base for story feeds (default: "https://i.instagram.com/api/v1/feed/user/")
    #[serde(default = "default_stories_base_url")]
    pub stories_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stories_base_url: default_stories_base_url(),
        }
    }
}

/// Retry configuration for transient download failures
///
/// The default is a single retry after a fixed 5 second pause.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0, fixed backoff)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// HTTP and concurrency settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Concurrent downloads per target (default: 10)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for asset downloads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Remote endpoints
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

/// Login credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Main configuration for InstagramScraper
///
/// Fields are organized into logical sub-configs:
/// - [`output`](OutputConfig) - destination, metadata sidecar, incremental mode
/// - [`media`](MediaConfig) - media-type filter and per-target cap
/// - [`network`](NetworkConfig) - concurrency, timeouts, retry, endpoints
///
/// `output` and `media` are flattened, so the serialized form stays flat.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Users, hashtags and locations to scrape, in order
    pub targets: Vec<Target>,

    /// Storage settings
    #[serde(flatten)]
    pub output: OutputConfig,

    /// Media selection settings
    #[serde(flatten)]
    pub media: MediaConfig,

    /// HTTP and concurrency settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Log in before scraping (required for stories)
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Suppress progress reporting; never changes what is downloaded
    #[serde(default)]
    pub quiet: bool,
}

impl Config {
    /// Check the configuration for values the scraper cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::config("targets", "at least one target is required"));
        }
        if let Some(target) = self.targets.iter().find(|t| t.name().trim().is_empty()) {
            return Err(Error::config(
                "targets",
                format!("empty target name in {target:?}"),
            ));
        }
        if self.network.concurrency == 0 {
            return Err(Error::config("concurrency", "must be at least 1"));
        }
        if let Some(creds) = &self.credentials
            && (creds.username.is_empty() || creds.password.is_empty())
        {
            return Err(Error::config(
                "credentials",
                "must provide login user AND password",
            ));
        }
        for (key, base) in [
            ("base_url", &self.network.endpoints.base_url),
            ("stories_base_url", &self.network.endpoints.stories_base_url),
        ] {
            url::Url::parse(base).map_err(|e| Error::config(key, format!("{base}: {e}")))?;
            if !base.ends_with('/') {
                return Err(Error::config(key, format!("{base} must end with '/'")));
            }
        }
        Ok(())
    }

    /// Whether the given media kind passes the filter
    pub fn wants(&self, kind: MediaKind) -> bool {
        self.media.media_types.contains(&kind)
    }
}

fn default_latest_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "mp4".to_string()]
}

fn default_media_types() -> BTreeSet<MediaKind> {
    [MediaKind::Image, MediaKind::Video, MediaKind::Story]
        .into_iter()
        .collect()
}

fn default_base_url() -> String {
    "https://www.instagram.com/".to_string()
}

fn default_stories_base_url() -> String {
    "https://i.instagram.com/api/v1/feed/user/".to_string()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_concurrency() -> usize {
    10
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
