//! Lazy walker over a cursor-paginated media listing.
//!
//! [`MediaStream`] pulls one page at a time from a [`PageFetcher`] and hands
//! out records in page order. It is finite and single-pass: once a page
//! without a cursor has been drained (or the incremental boundary was crossed)
//! the stream is exhausted for good.

use crate::error::{Error, Result};
use crate::high_water;
use crate::types::{Cursor, HighWaterMark, MediaKind, Page, RawMediaRecord};
use async_trait::async_trait;
use futures::Stream;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// Fetches one page of a listing, enabling testability.
///
/// Implementations decode the remote envelope and report "not found" or
/// "private" conditions as errors instead of returning an empty page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page starting at `cursor` (`None` for the first page)
    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PagingState {
    NotStarted,
    More(Cursor),
    Exhausted,
}

/// Pull-based sequence of listing records with type and incremental filtering.
pub struct MediaStream {
    fetcher: Arc<dyn PageFetcher>,
    target: String,
    kinds: BTreeSet<MediaKind>,
    mark: HighWaterMark,
    incremental: bool,
    buffer: VecDeque<RawMediaRecord>,
    state: PagingState,
    pages_fetched: usize,
}

impl MediaStream {
    /// Create a stream over `fetcher`'s listing for `target`.
    ///
    /// No request is made until the first call to [`MediaStream::next`].
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        target: impl Into<String>,
        kinds: BTreeSet<MediaKind>,
        mark: HighWaterMark,
        incremental: bool,
    ) -> Self {
        Self {
            fetcher,
            target: target.into(),
            kinds,
            mark,
            incremental,
            buffer: VecDeque::new(),
            state: PagingState::NotStarted,
            pages_fetched: 0,
        }
    }

    /// Number of pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next accepted record, or `None` once the listing is exhausted.
    ///
    /// An empty first page fails with [`Error::TargetPrivateOrEmpty`]. After
    /// any error the stream is exhausted.
    pub async fn next(&mut self) -> Result<Option<RawMediaRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }

            let cursor = match std::mem::replace(&mut self.state, PagingState::Exhausted) {
                PagingState::Exhausted => return Ok(None),
                PagingState::NotStarted => None,
                PagingState::More(cursor) => Some(cursor),
            };

            let page = self.fetcher.fetch_page(cursor.as_ref()).await?;
            self.pages_fetched += 1;
            tracing::debug!(
                name = %self.target,
                page = self.pages_fetched,
                records = page.records.len(),
                has_more = page.next_cursor.is_some(),
                "Fetched listing page"
            );
            self.absorb(page)?;
        }
    }

    /// Classify a whole page, then decide whether to advance the cursor.
    fn absorb(&mut self, page: Page) -> Result<()> {
        if page.records.is_empty() {
            if self.pages_fetched == 1 {
                return Err(Error::TargetPrivateOrEmpty(self.target.clone()));
            }
            return Ok(());
        }

        // The listing is newest-first: once the last record is old, every later page is too
        let last_is_new = page
            .records
            .last()
            .is_some_and(|record| self.is_new(record));

        for record in page.records {
            if self.passes_type_filter(&record) && self.is_new(&record) {
                self.buffer.push_back(record);
            }
        }

        if let Some(cursor) = page.next_cursor {
            if last_is_new {
                self.state = PagingState::More(cursor);
            } else {
                tracing::debug!(
                    name = %self.target,
                    mark = self.mark.0,
                    "Reached previously downloaded media, stopping pagination"
                );
            }
        }
        Ok(())
    }

    fn is_new(&self, record: &RawMediaRecord) -> bool {
        high_water::is_new(record.timestamp(), self.mark, self.incremental)
    }

    fn passes_type_filter(&self, record: &RawMediaRecord) -> bool {
        record
            .media_kinds()
            .iter()
            .any(|kind| self.kinds.contains(kind))
    }

    /// Adapt into a [`futures::Stream`]; ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<RawMediaRecord>> + Send {
        futures::stream::unfold(self, |mut source| async move {
            match source.next().await {
                Ok(Some(record)) => Some((Ok(record), source)),
                Ok(None) => None,
                Err(e) => Some((Err(e), source)),
            }
        })
    }
}
