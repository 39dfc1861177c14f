//! Paginated listings: a user's feed and hashtag/location browsing

use super::{InstagramClient, check_status, cookie_value};
use crate::error::{Error, Result};
use crate::source::PageFetcher;
use crate::types::{Cursor, Page, RawMediaRecord, RecordKind};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// A user's own feed: `{user}/media/`, continued with `?max_id=<last id>`
pub struct UserFeed {
    client: Arc<InstagramClient>,
    username: String,
}

impl UserFeed {
    /// Create a feed for `username`
    pub fn new(client: Arc<InstagramClient>, username: impl Into<String>) -> Self {
        Self {
            client,
            username: username.into(),
        }
    }
}

#[async_trait]
impl PageFetcher for UserFeed {
    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page> {
        let url = format!("{}{}/media/", self.client.base_url(), self.username);
        let mut request = self.client.http().get(&url);
        if let Some(cursor) = cursor {
            request = request.query(&[("max_id", cursor.as_str())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        check_status(response.status(), &url, Some(self.username.as_str()))?;

        let body: Value = response.json().await?;
        parse_user_page(body)
    }
}

fn parse_user_page(mut body: Value) -> Result<Page> {
    let more_available = body
        .get("more_available")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let items = match body.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(Error::InvalidResponse(
                "user feed 'items' is not an array".to_string(),
            ));
        }
    };

    // The cursor comes from the raw last item, even if it is later skipped
    let last_id = items.last().and_then(|item| match item.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match RawMediaRecord::from_feed_item(item) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, "Skipping feed item"),
        }
    }

    Ok(Page {
        records,
        next_cursor: last_id.filter(|_| more_available).map(Cursor::new),
    })
}

/// Which browsing listing a [`GraphFeed`] walks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphKind {
    /// `explore/tags/<tag>/`
    Hashtag,
    /// `explore/locations/<id>/`
    Location,
}

impl GraphKind {
    fn record_kind(self) -> RecordKind {
        match self {
            GraphKind::Hashtag => RecordKind::HashtagNode,
            GraphKind::Location => RecordKind::LocationNode,
        }
    }

    fn first_page_path(self, name: &str) -> String {
        match self {
            GraphKind::Hashtag => format!("explore/tags/{name}/?__a=1"),
            GraphKind::Location => format!("explore/locations/{name}/?__a=1"),
        }
    }

    /// Key wrapping `media` in the first-page envelope
    fn envelope_key(self) -> &'static str {
        match self {
            GraphKind::Hashtag => "tag",
            GraphKind::Location => "location",
        }
    }

    /// Graph query for the page after `cursor`
    fn query(self, name: &str, cursor: &str) -> String {
        match self {
            GraphKind::Hashtag => format!(
                "ig_hashtag({name}) {{ media.after({cursor}, 20) {{ nodes {{ id, code, date, \
                 caption, display_src, is_video }}, page_info }} }}"
            ),
            GraphKind::Location => format!(
                "ig_location({name}) {{ media.after({cursor}, 12) {{ count, nodes {{ caption, \
                 code, comments {{ count }}, comments_disabled, date, dimensions {{ height, \
                 width }}, display_src, id, is_video, likes {{ count }}, owner {{ id }}, \
                 thumbnail_src, video_views }}, page_info }} }}"
            ),
        }
    }
}

/// Hashtag or location listing
///
/// The first page is a plain GET; later pages are graph queries posted to
/// `query/`, which need the CSRF token handed out with the first page.
pub struct GraphFeed {
    client: Arc<InstagramClient>,
    kind: GraphKind,
    name: String,
    csrf_token: Mutex<Option<String>>,
}

impl GraphFeed {
    /// Create a listing of `kind` for the tag or location id `name`
    pub fn new(client: Arc<InstagramClient>, kind: GraphKind, name: impl Into<String>) -> Self {
        let csrf_token = Mutex::new(client.csrf_token().map(str::to_string));
        Self {
            client,
            kind,
            name: name.into(),
            csrf_token,
        }
    }

    fn remember_csrf(&self, token: Option<String>) {
        if let Some(token) = token
            && let Ok(mut guard) = self.csrf_token.lock()
        {
            *guard = Some(token);
        }
    }

    fn current_csrf(&self) -> Option<String> {
        self.csrf_token.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl PageFetcher for GraphFeed {
    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page> {
        let base = self.client.base_url();
        let response = match cursor {
            None => {
                let url = format!("{base}{}", self.kind.first_page_path(&self.name));
                let response = self
                    .client
                    .http()
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| Error::from_request(&url, e))?;
                check_status(response.status(), &url, Some(self.name.as_str()))?;
                self.remember_csrf(cookie_value(&response, "csrftoken"));
                response
            }
            Some(cursor) => {
                let url = format!("{base}query/");
                let query = self.kind.query(&self.name, cursor.as_str());
                let mut request = self
                    .client
                    .http()
                    .post(&url)
                    .header("Referer", base)
                    .form(&[("q", query.as_str())]);
                if let Some(token) = self.current_csrf() {
                    request = request.header("X-CSRFToken", token);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::from_request(&url, e))?;
                check_status(response.status(), &url, Some(self.name.as_str()))?;
                response
            }
        };

        let body: Value = response.json().await?;
        let media = match cursor {
            None => body
                .get(self.kind.envelope_key())
                .and_then(|envelope| envelope.get("media")),
            Some(_) => body.get("media"),
        };
        match media {
            Some(media) => parse_graph_media(media, self.kind.record_kind()),
            // No media block at all reads as "nothing visible"
            None => Ok(Page::default()),
        }
    }
}

fn parse_graph_media(media: &Value, kind: RecordKind) -> Result<Page> {
    let nodes = match media.get("nodes") {
        Some(Value::Array(nodes)) => nodes.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(Error::InvalidResponse(
                "graph listing 'nodes' is not an array".to_string(),
            ));
        }
    };

    let has_next = media
        .pointer("/page_info/has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let next_cursor = media
        .pointer("/page_info/end_cursor")
        .and_then(Value::as_str)
        .filter(|_| has_next)
        .map(Cursor::new);

    Ok(Page {
        records: nodes
            .into_iter()
            .map(|node| RawMediaRecord::new(kind, node))
            .collect(),
        next_cursor,
    })
}
