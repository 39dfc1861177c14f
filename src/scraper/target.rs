//! Pipeline for a single target
//!
//! `Init → FetchingUser (users only) → Paginating → Draining → Done | Failed`.
//! A target-fatal error skips straight to draining the downloads already
//! submitted, then marks the target failed; the metadata sidecar is only
//! written for targets that finish normally.

use super::InstagramScraper;
use super::download::Downloader;
use super::metadata;
use super::pool::WorkerPool;
use crate::error::{Error, Result};
use crate::high_water;
use crate::resolver::{self, Resolved};
use crate::source::{MediaStream, PageFetcher};
use crate::types::{
    Asset, DownloadOutcome, Event, HighWaterMark, MediaKind, OutcomeStatus, RawMediaRecord,
    Target, TargetPhase, TargetReport, TargetStatus,
};
use crate::utils;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One asset download as submitted to the pool
struct DownloadJob {
    downloader: Arc<Downloader>,
    event_tx: broadcast::Sender<Event>,
    quiet: bool,
    target: String,
    dir: PathBuf,
}

impl DownloadJob {
    async fn run(self, asset: Asset) -> DownloadOutcome {
        let outcome = self.downloader.fetch_and_store(&asset, &self.dir).await;
        let file_name = asset.file_name().unwrap_or_default();
        let event = match outcome.status {
            OutcomeStatus::Downloaded if !self.quiet => Some(Event::AssetDownloaded {
                target: self.target,
                file_name,
            }),
            OutcomeStatus::Skipped if !self.quiet => Some(Event::AssetSkipped {
                target: self.target,
                file_name,
            }),
            OutcomeStatus::Failed => Some(Event::AssetFailed {
                target: self.target,
                url: asset.url.clone(),
                error: outcome.error.clone().unwrap_or_default(),
            }),
            _ => None,
        };
        if let Some(event) = event {
            self.event_tx.send(event).ok();
        }
        outcome
    }
}

/// Mutable state of one target's run
struct TargetRun {
    name: String,
    destination: PathBuf,
    mark: HighWaterMark,
    pool: WorkerPool<DownloadOutcome>,
    report: TargetReport,
}

impl InstagramScraper {
    /// Scrape a single target into its destination directory
    ///
    /// Never fails: errors are recorded in the returned report's status.
    pub async fn scrape_target(&self, target: &Target) -> TargetReport {
        let listing = self.listing_for(target);
        self.run_target(target, listing).await
    }

    pub(crate) async fn run_target(
        &self,
        target: &Target,
        listing: Arc<dyn PageFetcher>,
    ) -> TargetReport {
        let output = &self.config.output;
        let destination = utils::destination_for(
            output.destination.as_deref(),
            output.retain_username,
            target.name(),
        );
        let mut run = TargetRun {
            name: target.name().to_string(),
            destination: destination.clone(),
            mark: HighWaterMark::UNSET,
            pool: WorkerPool::new(
                self.config.network.concurrency,
                self.cancel_token.clone(),
            ),
            report: TargetReport::new(target.clone(), destination),
        };

        tracing::info!(
            name = %run.name,
            destination = %run.destination.display(),
            "Scraping {}",
            target
        );
        self.emit_event(Event::TargetStarted {
            target: run.name.clone(),
            destination: run.destination.clone(),
        });
        self.enter_phase(&run.name, TargetPhase::Init);

        let result = match self.login_error() {
            Some(e) => Err(e),
            None => self.collect(target, listing, &mut run).await,
        };

        self.enter_phase(&run.name, TargetPhase::Draining);
        let TargetRun {
            name,
            mut pool,
            mut report,
            ..
        } = run;
        tracing::debug!(name = %name, pending = pool.len(), "Waiting for downloads");
        for joined in pool.drain().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::error!(name = %name, error = %e, "Download task failed to complete");
                    report.failed += 1;
                }
            }
        }

        match result {
            Ok(()) => {
                if self.config.output.media_metadata
                    && !report.metadata.is_empty()
                    && let Err(e) =
                        metadata::save_metadata(&report.destination, &name, &report.metadata).await
                {
                    tracing::warn!(name = %name, error = %e, "Could not save metadata");
                }

                self.enter_phase(&name, TargetPhase::Done);
                tracing::info!(
                    name = %name,
                    discovered = report.discovered,
                    downloaded = report.downloaded,
                    skipped = report.skipped,
                    failed = report.failed,
                    unresolved = report.unresolved,
                    "Target finished"
                );
                self.emit_event(Event::TargetFinished {
                    target: name,
                    downloaded: report.downloaded,
                    skipped: report.skipped,
                    failed: report.failed,
                });
            }
            Err(e) => {
                tracing::error!(name = %name, error = %e, "Target failed");
                report.status = TargetStatus::Failed(e.to_string());
                self.enter_phase(&name, TargetPhase::Failed);
                self.emit_event(Event::TargetFailed {
                    target: name,
                    error: e.to_string(),
                });
            }
        }

        report
    }

    async fn collect(
        &self,
        target: &Target,
        listing: Arc<dyn PageFetcher>,
        run: &mut TargetRun,
    ) -> Result<()> {
        utils::ensure_dir(&run.destination).await?;
        if self.config.output.latest {
            run.mark =
                high_water::scan(&run.destination, &self.config.output.latest_extensions).await?;
        }

        if target.is_user() {
            self.collect_user_extras(target.name(), run).await?;
        }

        self.enter_phase(&run.name, TargetPhase::Paginating);
        let mut stream = MediaStream::new(
            listing,
            run.name.clone(),
            self.config.media.media_types.clone(),
            run.mark,
            self.config.output.latest,
        );

        let maximum = self.config.media.maximum;
        let mut accepted = 0usize;
        loop {
            // The cap counts listing records, so a carousel may push assets past it
            if maximum != 0 && accepted >= maximum {
                tracing::debug!(name = %run.name, maximum, "Reached maximum item count");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    tracing::info!(name = %run.name, "Cancelled, stopping pagination");
                    break;
                }
                next = stream.next() => next?,
            };
            let Some(record) = next else {
                break;
            };

            accepted += 1;
            if !self.config.quiet {
                self.emit_event(Event::MediaFound {
                    target: run.name.clone(),
                    count: accepted,
                });
            }
            self.submit_record(record, run).await;
        }

        tracing::debug!(
            name = %run.name,
            pages = stream.pages_fetched(),
            records = accepted,
            "Pagination finished"
        );
        Ok(())
    }

    /// Profile picture and stories; only a missing user is fatal here
    async fn collect_user_extras(&self, username: &str, run: &mut TargetRun) -> Result<()> {
        let want_picture = self.config.wants(MediaKind::ProfilePic);
        let want_stories = self.config.wants(MediaKind::Story) && self.client.is_logged_in();
        if !want_picture && !want_stories {
            return Ok(());
        }

        self.enter_phase(&run.name, TargetPhase::FetchingUser);
        let user = match self.client.fetch_user(username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(
                    name = %username,
                    "No profile data, skipping profile picture and stories"
                );
                return Ok(());
            }
            Err(e) if e.is_target_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    name = %username,
                    error = %e,
                    "User lookup failed, skipping profile picture and stories"
                );
                return Ok(());
            }
        };

        if want_picture {
            match user.custom_profile_pic() {
                Some(url) => self.submit_record(RawMediaRecord::profile_pic(url), run).await,
                None => tracing::debug!(name = %username, "Default profile picture, skipping"),
            }
        }

        if want_stories {
            match self.client.fetch_stories(&user.id).await {
                Ok(stories) => {
                    tracing::debug!(name = %username, count = stories.len(), "Fetched stories");
                    for story in stories {
                        if high_water::is_new(story.timestamp(), run.mark, self.config.output.latest)
                        {
                            self.submit_record(story, run).await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(name = %username, error = %e, "Could not fetch stories");
                }
            }
        }

        Ok(())
    }

    /// Resolve `record` and hand each of its assets to the pool
    async fn submit_record(&self, record: RawMediaRecord, run: &mut TargetRun) {
        let resolved = match resolver::resolve(&record) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(name = %run.name, error = %e, "Skipping record");
                run.report.unresolved += 1;
                return;
            }
        };

        let mut assets = Vec::with_capacity(resolved.len());
        let mut lookup_failed = false;
        for item in resolved {
            match item {
                Resolved::Ready(asset) => assets.push(asset),
                Resolved::NeedsVideoUrl(pending) => {
                    match self.client.video_url(&pending.code).await {
                        Ok(url) => assets.push(pending.complete(&url)),
                        Err(e) => {
                            let e = Error::ResolutionFailed {
                                record: record.label(),
                                reason: e.to_string(),
                            };
                            tracing::warn!(name = %run.name, error = %e, "Skipping record");
                            lookup_failed = true;
                        }
                    }
                }
            }
        }

        // Carousel items of unwanted kinds are dropped here
        assets.retain(|asset| self.config.wants(asset.kind));
        if assets.is_empty() {
            if lookup_failed {
                run.report.unresolved += 1;
            }
            return;
        }

        run.report
            .metadata
            .push(metadata::annotate(&record.value, &assets));
        for asset in assets {
            let job = DownloadJob {
                downloader: Arc::clone(&self.downloader),
                event_tx: self.event_tx.clone(),
                quiet: self.config.quiet,
                target: run.name.clone(),
                dir: run.destination.clone(),
            };
            if !run.pool.submit(job.run(asset)).await {
                tracing::info!(name = %run.name, "Cancelled, not queueing further downloads");
                return;
            }
            run.report.discovered += 1;
        }
    }

    fn enter_phase(&self, name: &str, phase: TargetPhase) {
        tracing::debug!(name = %name, ?phase, "Target phase");
        self.emit_event(Event::PhaseChanged {
            target: name.to_string(),
            phase,
        });
    }
}
