//! Scrape coordinator
//!
//! [`InstagramScraper`] runs the configured targets one after another. Each
//! target walks its listing sequentially and fans downloads out into a bounded
//! worker pool that is drained before the target's report is returned:
//! - [`target`] - per-target pipeline (user extras, pagination, draining)
//! - [`download`] - idempotent asset download with one anonymous retry
//! - [`pool`] - bounded worker pool
//! - [`metadata`] - JSON sidecar

mod download;
mod metadata;
mod pool;
mod target;


pub use download::{AssetTransport, Downloader, ReqwestTransport};
pub use metadata::save_metadata;

use crate::client::{GraphFeed, GraphKind, InstagramClient, UserFeed};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::source::PageFetcher;
use crate::types::{Event, ScrapeSummary, Target};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event channel before slow subscribers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Scrapes users, hashtags and locations into local directories
#[derive(Clone)]
pub struct InstagramScraper {
    config: Arc<Config>,
    client: Arc<InstagramClient>,
    downloader: Arc<Downloader>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
    /// Login user whose credentials were rejected; every target fails with it
    login_failure: Option<String>,
}

impl InstagramScraper {
    /// Create a scraper, logging in first when credentials are configured
    ///
    /// A rejected login does not fail construction: each target then fails
    /// with [`Error::AuthenticationFailed`] instead.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid, or an error
    /// if the HTTP clients cannot be built.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use instagram_scraper::{Config, InstagramScraper, Target};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = Config {
    ///         targets: vec![Target::User("alice".to_string())],
    ///         ..Default::default()
    ///     };
    ///     let scraper = InstagramScraper::new(config).await?;
    ///
    ///     let mut events = scraper.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("{:?}", event);
    ///         }
    ///     });
    ///
    ///     let summary = scraper.scrape().await;
    ///     println!("downloaded {} files", summary.downloaded());
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mut client = InstagramClient::new(&config.network)?;
        let mut login_failure = None;
        if let Some(credentials) = &config.credentials
            && let Err(e) = client.login(credentials).await
        {
            tracing::error!(user = %credentials.username, error = %e, "Login failed");
            login_failure = Some(credentials.username.clone());
        }

        let transport = Arc::new(ReqwestTransport::new(&client));
        let mut scraper = Self::with_transport(config, client, transport)?;
        scraper.login_failure = login_failure;
        Ok(scraper)
    }

    /// Assemble a scraper around an existing client and asset transport
    pub(crate) fn with_transport(
        config: Config,
        client: InstagramClient,
        transport: Arc<dyn AssetTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let downloader = Downloader::new(transport, config.network.retry.clone(), config.quiet);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            downloader: Arc::new(downloader),
            event_tx,
            cancel_token: CancellationToken::new(),
            login_failure: None,
        })
    }

    /// Subscribe to scrape events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Stop paginating as soon as possible.
    ///
    /// Downloads already submitted are allowed to finish; targets not yet
    /// started are skipped.
    pub fn cancel(&self) {
        tracing::info!("Scrape cancellation requested");
        self.cancel_token.cancel();
    }

    /// Whether [`InstagramScraper::cancel`] was called
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Scrape every configured target in order, then log out
    ///
    /// A failing target is recorded in its report; the remaining targets still run.
    pub async fn scrape(&self) -> ScrapeSummary {
        let mut summary = ScrapeSummary::default();

        for target in &self.config.targets {
            if self.is_cancelled() {
                tracing::info!(name = %target, "Cancelled, skipping remaining targets");
                break;
            }
            summary.targets.push(self.scrape_target(target).await);
        }

        self.client.logout().await;

        tracing::info!(
            targets = summary.targets.len(),
            discovered = summary.discovered(),
            downloaded = summary.downloaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            failed_targets = summary.failed_targets().count(),
            "Scrape finished"
        );
        summary
    }

    /// Listing for `target` backed by the HTTP client
    fn listing_for(&self, target: &Target) -> Arc<dyn PageFetcher> {
        let client = Arc::clone(&self.client);
        match target {
            Target::User(name) => Arc::new(UserFeed::new(client, name.clone())),
            Target::Hashtag(tag) => Arc::new(GraphFeed::new(client, GraphKind::Hashtag, tag.clone())),
            Target::Location(id) => {
                Arc::new(GraphFeed::new(client, GraphKind::Location, id.clone()))
            }
        }
    }

    /// Emit an event to all subscribers; dropped when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    fn login_error(&self) -> Option<Error> {
        self.login_failure
            .as_ref()
            .map(|user| Error::AuthenticationFailed(user.clone()))
    }
}
