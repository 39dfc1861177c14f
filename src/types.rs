//! Core types for instagram-scraper

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Something to scrape: a user's feed, a hashtag, or a location
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// A user's own feed, addressed by username
    User(String),
    /// A hashtag, without the leading `#`
    Hashtag(String),
    /// A location, addressed by its numeric id
    Location(String),
}

impl Target {
    /// The bare name used for URLs, directories and the metadata file
    pub fn name(&self) -> &str {
        match self {
            Target::User(name) | Target::Hashtag(name) | Target::Location(name) => name,
        }
    }

    /// Whether this target is a user (profile picture and stories only exist for users)
    pub fn is_user(&self) -> bool {
        matches!(self, Target::User(_))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::User(name) => write!(f, "{name}"),
            Target::Hashtag(tag) => write!(f, "#{tag}"),
            Target::Location(id) => write!(f, "location {id}"),
        }
    }
}

/// Kind of a downloadable asset, also used as the media-type filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video
    Video,
    /// Story item (image or video, only visible when logged in)
    Story,
    /// The target's profile picture
    ProfilePic,
}

/// Shape of a raw record as returned by one of the listing endpoints
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Single image from a user feed
    Image,
    /// Single video from a user feed
    Video,
    /// Multi-item post from a user feed
    Carousel,
    /// Story item
    Story,
    /// Node from a hashtag listing
    HashtagNode,
    /// Node from a location listing
    LocationNode,
    /// Synthetic record wrapping a profile picture URL
    ProfilePic,
}

/// Timestamp fields in order of preference
const TIMESTAMP_FIELDS: [&str; 3] = ["created_time", "taken_at", "date"];

/// Decoded JSON record from the remote API, tagged with its shape
#[derive(Clone, Debug, PartialEq)]
pub struct RawMediaRecord {
    /// Which shape the JSON has
    pub kind: RecordKind,
    /// The record exactly as the API returned it
    pub value: Value,
}

/// Creation time given to profile pictures (2010-10-06, the service's launch)
pub const PROFILE_PIC_TIME: i64 = 1_286_323_200;

impl RawMediaRecord {
    /// Wrap a JSON value whose shape is already known
    pub fn new(kind: RecordKind, value: Value) -> Self {
        Self { kind, value }
    }

    /// Classify a user feed item by its `type` field
    pub fn from_feed_item(value: Value) -> Result<Self> {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some("image") => RecordKind::Image,
            Some("video") => RecordKind::Video,
            Some("carousel") => RecordKind::Carousel,
            other => {
                return Err(Error::InvalidResponse(format!(
                    "unknown feed item type {:?}",
                    other.unwrap_or("<missing>")
                )));
            }
        };
        Ok(Self { kind, value })
    }

    /// Build the synthetic record for a profile picture.
    ///
    /// The API gives profile pictures no creation time. They are stamped with
    /// [`PROFILE_PIC_TIME`] so they never raise the incremental mark above
    /// real posts.
    pub fn profile_pic(url: &str) -> Self {
        Self {
            kind: RecordKind::ProfilePic,
            value: serde_json::json!({ "url": url, "created_time": PROFILE_PIC_TIME }),
        }
    }

    /// The record's id, if any (numbers are rendered as strings)
    pub fn id(&self) -> Option<String> {
        match self.value.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The record's shortcode, if any
    pub fn code(&self) -> Option<&str> {
        self.value.get("code").and_then(Value::as_str)
    }

    /// Id, shortcode, or a placeholder, for log lines and error messages
    pub fn label(&self) -> String {
        self.id()
            .or_else(|| self.code().map(str::to_string))
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    /// Creation time: the first present field of `created_time`, `taken_at`, `date`
    pub fn timestamp(&self) -> Option<i64> {
        TIMESTAMP_FIELDS
            .iter()
            .find_map(|field| self.value.get(*field).and_then(parse_timestamp))
    }

    /// Caption text, whether stored as a plain string or as `{"text": ...}`
    pub fn caption(&self) -> Option<&str> {
        match self.value.get("caption")? {
            Value::String(s) => Some(s),
            Value::Object(obj) => obj.get("text").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Whether a graph node is marked as a video
    pub fn is_video_node(&self) -> bool {
        self.value
            .get("is_video")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Asset kinds this record can produce, used by the media-type filter.
    ///
    /// A carousel reports the kinds of its sub-items.
    pub fn media_kinds(&self) -> Vec<MediaKind> {
        match self.kind {
            RecordKind::Image => vec![MediaKind::Image],
            RecordKind::Video => vec![MediaKind::Video],
            RecordKind::Story => vec![MediaKind::Story],
            RecordKind::ProfilePic => vec![MediaKind::ProfilePic],
            RecordKind::HashtagNode | RecordKind::LocationNode => {
                if self.is_video_node() {
                    vec![MediaKind::Video]
                } else {
                    vec![MediaKind::Image]
                }
            }
            RecordKind::Carousel => self
                .value
                .get("carousel_media")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match item.get("type").and_then(Value::as_str) {
                            Some("image") => Some(MediaKind::Image),
                            Some("video") => Some(MediaKind::Video),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalized unit of download work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// URL of the largest available rendition
    pub url: String,
    /// Unix timestamp used for the file's mtime and atime
    pub created_at: i64,
    /// Hashtags found in the record's caption
    pub tags: BTreeSet<String>,
    /// What kind of media this is
    pub kind: MediaKind,
}

impl Asset {
    /// File name the asset is stored under (final path segment of the URL)
    pub fn file_name(&self) -> Option<String> {
        crate::utils::file_name_from_url(&self.url)
    }
}

/// Opaque continuation token for the next listing page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    /// Create a new Cursor
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One page of a listing
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    /// Records in API order (newest first)
    pub records: Vec<RawMediaRecord>,
    /// Cursor for the next page, `None` at the end of the listing
    pub next_cursor: Option<Cursor>,
}

/// Modification time of the newest matching file present before the run started.
///
/// Zero means no prior run was detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighWaterMark(pub i64);

impl HighWaterMark {
    /// No prior run detected
    pub const UNSET: HighWaterMark = HighWaterMark(0);

    /// Whether a prior run was detected
    pub fn is_set(&self) -> bool {
        self.0 > 0
    }
}

/// Result of handing one asset to the downloader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Bytes were fetched and written
    Downloaded,
    /// The file already existed
    Skipped,
    /// Fetch or write failed after the retry
    Failed,
}

/// Per-asset download outcome
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// The asset that was submitted
    pub asset: Asset,
    /// What happened
    pub status: OutcomeStatus,
    /// Error message for failed outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of network fetches performed (0 when skipped)
    pub attempts: u32,
}

impl DownloadOutcome {
    /// Whether the asset is now on disk
    pub fn success(&self) -> bool {
        !matches!(self.status, OutcomeStatus::Failed)
    }
}

/// Phase of a single target's pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    /// Destination resolved, nothing fetched yet
    Init,
    /// Looking up the user for the profile picture and stories
    FetchingUser,
    /// Walking the paginated listing
    Paginating,
    /// Waiting for submitted downloads to finish
    Draining,
    /// Finished normally
    Done,
    /// Aborted by a target-fatal error
    Failed,
}

/// Terminal status of a target
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// All steps ran
    Done,
    /// Aborted with the given reason
    Failed(String),
}

/// Everything that happened for one target
#[derive(Clone, Debug, Serialize)]
pub struct TargetReport {
    /// The target
    pub target: Target,
    /// Directory the assets were written to
    pub destination: PathBuf,
    /// Terminal status
    pub status: TargetStatus,
    /// Assets submitted for download
    pub discovered: usize,
    /// Assets fetched and written
    pub downloaded: usize,
    /// Assets already present on disk
    pub skipped: usize,
    /// Assets whose download failed
    pub failed: usize,
    /// Records that could not be reduced to any asset
    pub unresolved: usize,
    /// Per-asset outcomes, in completion order
    pub outcomes: Vec<DownloadOutcome>,
    /// Records with at least one resolved asset, in listing order
    #[serde(skip)]
    pub metadata: Vec<Value>,
}

impl TargetReport {
    pub(crate) fn new(target: Target, destination: PathBuf) -> Self {
        Self {
            target,
            destination,
            status: TargetStatus::Done,
            discovered: 0,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            unresolved: 0,
            outcomes: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Record an outcome and update the counters
    pub(crate) fn record(&mut self, outcome: DownloadOutcome) {
        match outcome.status {
            OutcomeStatus::Downloaded => self.downloaded += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Whether the target finished without a fatal error
    pub fn is_done(&self) -> bool {
        matches!(self.status, TargetStatus::Done)
    }
}

/// Summary of a whole run across all targets
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScrapeSummary {
    /// One report per target, in configuration order
    pub targets: Vec<TargetReport>,
}

impl ScrapeSummary {
    /// Total assets discovered
    pub fn discovered(&self) -> usize {
        self.targets.iter().map(|t| t.discovered).sum()
    }

    /// Total assets downloaded
    pub fn downloaded(&self) -> usize {
        self.targets.iter().map(|t| t.downloaded).sum()
    }

    /// Total assets skipped because they were already present
    pub fn skipped(&self) -> usize {
        self.targets.iter().map(|t| t.skipped).sum()
    }

    /// Total failed assets
    pub fn failed(&self) -> usize {
        self.targets.iter().map(|t| t.failed).sum()
    }

    /// Targets that were aborted
    pub fn failed_targets(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| !t.is_done())
    }
}

/// Event emitted while scraping
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Work on a target started
    TargetStarted {
        /// Target name
        target: String,
        /// Destination directory
        destination: PathBuf,
    },

    /// A target moved to a new phase
    PhaseChanged {
        /// Target name
        target: String,
        /// New phase
        phase: TargetPhase,
    },

    /// A listing record was accepted and submitted
    MediaFound {
        /// Target name
        target: String,
        /// Records accepted so far
        count: usize,
    },

    /// An asset was written to disk
    AssetDownloaded {
        /// Target name
        target: String,
        /// Stored file name
        file_name: String,
    },

    /// An asset was already on disk
    AssetSkipped {
        /// Target name
        target: String,
        /// Stored file name
        file_name: String,
    },

    /// An asset failed after the retry
    AssetFailed {
        /// Target name
        target: String,
        /// Asset URL
        url: String,
        /// Error message
        error: String,
    },

    /// A target finished normally
    TargetFinished {
        /// Target name
        target: String,
        /// Assets downloaded
        downloaded: usize,
        /// Assets skipped
        skipped: usize,
        /// Assets failed
        failed: usize,
    },

    /// A target was aborted
    TargetFailed {
        /// Target name
        target: String,
        /// Error message
        error: String,
    },
}
