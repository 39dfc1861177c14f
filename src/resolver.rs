//! Asset resolution: raw listing records to downloadable assets.
//!
//! Every record shape is handled by one arm of an exhaustive match on
//! [`RecordKind`]. Resolution is pure: the only case that needs the network
//! (a video node from a hashtag or location listing) is returned as
//! [`Resolved::NeedsVideoUrl`] for the caller to complete.
//!
//! URLs are normalized to address the largest rendition:
//! - the `?query` suffix is dropped
//! - `/s640x640/`-style size segments are dropped
//! - `/c0.135.1080.1080/`-style crop segments are dropped

use crate::error::{Error, Result};
use crate::types::{Asset, MediaKind, RawMediaRecord, RecordKind};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static SIZE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/s\d{3,}x\d{3,}/").expect("size segment regex"));

#[allow(clippy::expect_used)]
static CROP_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/c\d{1,4}\.\d{1,4}\.\d{1,4}\.\d{1,4}/").expect("crop segment regex")
});

// A hashtag body is word characters plus pictographic emoji, with ZWJ and
// variation selectors so multi-codepoint emoji stay in one tag.
#[allow(clippy::expect_used)]
static HASHTAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#([\w\p{Extended_Pictographic}\p{Emoji_Modifier}\x{200D}\x{FE0F}]+)")
        .expect("hashtag regex")
});

/// One resolved unit of a record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    /// Directly downloadable
    Ready(Asset),
    /// A video node whose URL must be looked up by shortcode first
    NeedsVideoUrl(PendingVideo),
}

/// Video node waiting for its detail lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingVideo {
    /// Post shortcode for the detail lookup
    pub code: String,
    /// Creation time of the node
    pub created_at: i64,
    /// Hashtags from the node's caption
    pub tags: BTreeSet<String>,
}

impl PendingVideo {
    /// Complete the lookup with the video URL it returned
    pub fn complete(self, video_url: &str) -> Asset {
        Asset {
            url: strip_query(video_url).to_string(),
            created_at: self.created_at,
            tags: self.tags,
            kind: MediaKind::Video,
        }
    }
}

/// Resolve one record into its assets, in sub-item order.
///
/// Carousels yield one entry per sub-item; every other shape yields exactly
/// one. Fails with [`Error::ResolutionFailed`] when the record carries no
/// usable URL.
pub fn resolve(record: &RawMediaRecord) -> Result<Vec<Resolved>> {
    let created_at = creation_time(record);
    let tags = record.caption().map(extract_tags).unwrap_or_default();

    let resolved = match record.kind {
        RecordKind::Image | RecordKind::Video => {
            let kind = if record.kind == RecordKind::Image {
                MediaKind::Image
            } else {
                MediaKind::Video
            };
            let url = standard_resolution_url(&record.value, kind)
                .ok_or_else(|| failed(record, "no standard_resolution url"))?;
            vec![Resolved::Ready(Asset {
                url: normalize_url(url),
                created_at,
                tags,
                kind,
            })]
        }
        RecordKind::Carousel => resolve_carousel(record, created_at, &tags)?,
        RecordKind::Story => {
            let url = story_url(&record.value).ok_or_else(|| failed(record, "no story candidates"))?;
            vec![Resolved::Ready(Asset {
                url: strip_query(url).to_string(),
                created_at,
                tags,
                kind: MediaKind::Story,
            })]
        }
        RecordKind::HashtagNode | RecordKind::LocationNode => {
            if record.is_video_node() {
                let code = record
                    .code()
                    .ok_or_else(|| failed(record, "video node without shortcode"))?;
                vec![Resolved::NeedsVideoUrl(PendingVideo {
                    code: code.to_string(),
                    created_at,
                    tags,
                })]
            } else {
                let url = ["display_src", "display_url"]
                    .iter()
                    .find_map(|field| record.value.get(*field).and_then(Value::as_str))
                    .ok_or_else(|| failed(record, "node without display_src"))?;
                vec![Resolved::Ready(Asset {
                    url: normalize_url(url),
                    created_at,
                    tags,
                    kind: MediaKind::Image,
                })]
            }
        }
        RecordKind::ProfilePic => {
            let url = record
                .value
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| failed(record, "profile picture without url"))?;
            vec![Resolved::Ready(Asset {
                url: normalize_url(url),
                created_at,
                tags,
                kind: MediaKind::ProfilePic,
            })]
        }
    };

    Ok(resolved)
}

fn resolve_carousel(
    record: &RawMediaRecord,
    created_at: i64,
    tags: &BTreeSet<String>,
) -> Result<Vec<Resolved>> {
    let items = record
        .value
        .get("carousel_media")
        .and_then(Value::as_array)
        .ok_or_else(|| failed(record, "carousel without carousel_media"))?;

    let mut resolved = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let kind = match item.get("type").and_then(Value::as_str) {
            Some("video") => MediaKind::Video,
            Some("image") => MediaKind::Image,
            other => {
                tracing::warn!(
                    record = %record.label(),
                    index,
                    item_type = ?other,
                    "Skipping carousel item of unknown type"
                );
                continue;
            }
        };
        let Some(url) = standard_resolution_url(item, kind) else {
            tracing::warn!(record = %record.label(), index, "Skipping carousel item without url");
            continue;
        };
        resolved.push(Resolved::Ready(Asset {
            url: normalize_url(url),
            created_at,
            tags: tags.clone(),
            kind,
        }));
    }

    if resolved.is_empty() && !items.is_empty() {
        return Err(failed(record, "no carousel item had a usable url"));
    }
    Ok(resolved)
}

fn standard_resolution_url(value: &Value, kind: MediaKind) -> Option<&str> {
    let pointer = match kind {
        MediaKind::Video => "/videos/standard_resolution/url",
        _ => "/images/standard_resolution/url",
    };
    value.pointer(pointer).and_then(Value::as_str)
}

fn story_url(value: &Value) -> Option<&str> {
    value
        .pointer("/video_versions/0/url")
        .or_else(|| value.pointer("/image_versions2/candidates/0/url"))
        .and_then(Value::as_str)
}

/// Creation time of a record, falling back to the current time.
///
/// The fallback makes such files look new to the next incremental run; it is
/// kept for compatibility with files written by earlier runs.
pub fn creation_time(record: &RawMediaRecord) -> i64 {
    record.timestamp().unwrap_or_else(crate::utils::unix_now)
}

fn failed(record: &RawMediaRecord, reason: &str) -> Error {
    Error::ResolutionFailed {
        record: record.label(),
        reason: reason.to_string(),
    }
}

/// Drop the query string from a URL.
pub fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Normalize a media URL to its unscaled original. Idempotent.
pub fn normalize_url(url: &str) -> String {
    let mut normalized = strip_query(url).to_string();
    for segment in [&*SIZE_SEGMENT, &*CROP_SEGMENT] {
        // Adjacent segments share a slash, so one pass can leave a match behind
        while segment.is_match(&normalized) {
            normalized = segment.replace_all(&normalized, "/").into_owned();
        }
    }
    normalized
}

/// Extract `#hashtags` from caption text.
///
/// A `#` directly preceded by `&` starts an HTML entity (`&#39;`), not a tag.
pub fn extract_tags(text: &str) -> BTreeSet<String> {
    HASHTAG
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if text[..whole.start()].ends_with('&') {
                return None;
            }
            caps.get(1).map(|m| m.as_str().to_string())
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_image(url: &str) -> RawMediaRecord {
        RawMediaRecord::new(
            RecordKind::Image,
            json!({
                "id": "1_1",
                "type": "image",
                "created_time": "1485118406",
                "images": { "standard_resolution": { "url": url } },
            }),
        )
    }

    fn ready(resolved: Vec<Resolved>) -> Vec<Asset> {
        resolved
            .into_iter()
            .map(|r| match r {
                Resolved::Ready(asset) => asset,
                other => panic!("expected ready asset, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn image_url_is_normalized() {
        let record = feed_image("https://cdn.example.com/t51/s640x640/e35/photo1.jpg?ig_cache=1");

        let assets = ready(resolve(&record).unwrap());

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].url, "https://cdn.example.com/t51/e35/photo1.jpg");
        assert_eq!(assets[0].created_at, 1_485_118_406);
        assert_eq!(assets[0].kind, MediaKind::Image);
    }

    #[test]
    fn video_uses_videos_field() {
        let record = RawMediaRecord::new(
            RecordKind::Video,
            json!({
                "type": "video",
                "created_time": 10,
                "images": { "standard_resolution": { "url": "https://cdn.example.com/thumb.jpg" } },
                "videos": { "standard_resolution": { "url": "https://cdn.example.com/clip.mp4?x=1" } },
            }),
        );

        let assets = ready(resolve(&record).unwrap());

        assert_eq!(assets[0].url, "https://cdn.example.com/clip.mp4");
        assert_eq!(assets[0].kind, MediaKind::Video);
    }

    #[test]
    fn normalization_strips_size_and_crop_segments() {
        let url = "https://cdn.example.com/vp/s1080x1080/c0.135.1080.1080/photo.jpg?a=b";
        assert_eq!(normalize_url(url), "https://cdn.example.com/vp/photo.jpg");
    }

    #[test]
    fn normalization_is_idempotent() {
        let urls = [
            "https://cdn.example.com/s640x640/s150x150/photo.jpg?x",
            "https://cdn.example.com/c1.2.3.4/s320x320/photo.jpg",
            "https://cdn.example.com/photo.jpg",
            "https://cdn.example.com/s64x64/small.jpg",
        ];
        for url in urls {
            let once = normalize_url(url);
            assert!(!once.contains('?'), "{once} still has a query");
            assert!(!SIZE_SEGMENT.is_match(&once), "{once} still has a size segment");
            assert_eq!(normalize_url(&once), once, "normalizing {url} twice changed it");
        }
        // Two-digit sizes are not size segments
        assert_eq!(
            normalize_url("https://cdn.example.com/s64x64/small.jpg"),
            "https://cdn.example.com/s64x64/small.jpg"
        );
    }

    #[test]
    fn carousel_yields_one_asset_per_item_in_order() {
        let record = RawMediaRecord::new(
            RecordKind::Carousel,
            json!({
                "id": "9_1",
                "type": "carousel",
                "created_time": "100",
                "caption": { "text": "trip #travel" },
                "carousel_media": [
                    { "type": "image", "images": { "standard_resolution": { "url": "https://c.example.com/s640x640/a.jpg" } } },
                    { "type": "video", "videos": { "standard_resolution": { "url": "https://c.example.com/b.mp4?x=1" } } },
                    { "type": "image", "images": { "standard_resolution": { "url": "https://c.example.com/c.jpg" } } },
                ],
            }),
        );

        let assets = ready(resolve(&record).unwrap());

        let urls: Vec<_> = assets.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://c.example.com/a.jpg",
                "https://c.example.com/b.mp4",
                "https://c.example.com/c.jpg"
            ]
        );
        assert_eq!(assets[1].kind, MediaKind::Video);
        assert!(assets.iter().all(|a| a.created_at == 100));
        assert!(assets.iter().all(|a| a.tags.contains("travel")));
    }

    #[test]
    fn carousel_without_usable_items_fails() {
        let record = RawMediaRecord::new(
            RecordKind::Carousel,
            json!({ "id": "9_2", "carousel_media": [ { "type": "image" } ] }),
        );
        let err = resolve(&record).unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed { ref record, .. } if record == "9_2"));
    }

    #[test]
    fn story_prefers_video_then_first_candidate() {
        let image_story = RawMediaRecord::new(
            RecordKind::Story,
            json!({
                "taken_at": 1500000000,
                "image_versions2": { "candidates": [
                    { "url": "https://s.example.com/s1080x1080/full.jpg?sig=1" },
                    { "url": "https://s.example.com/small.jpg" },
                ] },
            }),
        );
        let assets = ready(resolve(&image_story).unwrap());
        // Story endpoints already serve full size; only the query is dropped
        assert_eq!(assets[0].url, "https://s.example.com/s1080x1080/full.jpg");
        assert_eq!(assets[0].kind, MediaKind::Story);
        assert_eq!(assets[0].created_at, 1_500_000_000);

        let video_story = RawMediaRecord::new(
            RecordKind::Story,
            json!({
                "taken_at": 1,
                "video_versions": [ { "url": "https://s.example.com/story.mp4?x=1" } ],
                "image_versions2": { "candidates": [ { "url": "https://s.example.com/cover.jpg" } ] },
            }),
        );
        let assets = ready(resolve(&video_story).unwrap());
        assert_eq!(assets[0].url, "https://s.example.com/story.mp4");
    }

    #[test]
    fn image_node_uses_display_src() {
        let record = RawMediaRecord::new(
            RecordKind::HashtagNode,
            json!({
                "id": "5", "code": "code5", "date": 1400000000, "is_video": false,
                "caption": "#sun &#39;quoted&#39;",
                "display_src": "https://n.example.com/s750x750/node.jpg",
            }),
        );
        let assets = ready(resolve(&record).unwrap());
        assert_eq!(assets[0].url, "https://n.example.com/node.jpg");
        assert_eq!(assets[0].tags.iter().collect::<Vec<_>>(), vec!["sun"]);
    }

    #[test]
    fn video_node_needs_lookup() {
        let record = RawMediaRecord::new(
            RecordKind::LocationNode,
            json!({ "id": "4", "code": "code4", "date": 77, "is_video": true, "caption": "#clip" }),
        );

        let resolved = resolve(&record).unwrap();

        assert_eq!(resolved.len(), 1);
        let Resolved::NeedsVideoUrl(pending) = resolved[0].clone() else {
            panic!("expected pending lookup, got {:?}", resolved[0]);
        };
        assert_eq!(pending.code, "code4");
        assert_eq!(pending.created_at, 77);

        let asset = pending.complete("https://v.example.com/video.mp4?sig=1");
        assert_eq!(asset.url, "https://v.example.com/video.mp4");
        assert_eq!(asset.kind, MediaKind::Video);
        assert!(asset.tags.contains("clip"));
    }

    #[test]
    fn video_node_without_code_fails() {
        let record = RawMediaRecord::new(
            RecordKind::HashtagNode,
            json!({ "id": "4", "is_video": true }),
        );
        assert!(resolve(&record).is_err());
    }

    #[test]
    fn profile_pic_strips_size_segment() {
        let record =
            RawMediaRecord::profile_pic("https://p.example.com/t51/s150x150/profile.jpg");
        let assets = ready(resolve(&record).unwrap());
        assert_eq!(assets[0].url, "https://p.example.com/t51/profile.jpg");
        assert_eq!(assets[0].kind, MediaKind::ProfilePic);
    }

    #[test]
    fn profile_pic_has_fixed_early_creation_time() {
        let before = crate::utils::unix_now();
        let record = RawMediaRecord::profile_pic("https://p.example.com/profile.jpg");
        let assets = ready(resolve(&record).unwrap());
        assert_eq!(assets[0].created_at, crate::types::PROFILE_PIC_TIME);
        assert!(assets[0].created_at < before);
    }

    #[test]
    fn missing_timestamp_falls_back_to_now() {
        let before = crate::utils::unix_now();
        let record = RawMediaRecord::new(
            RecordKind::Image,
            json!({ "images": { "standard_resolution": { "url": "https://c.example.com/x.jpg" } } }),
        );
        let assets = ready(resolve(&record).unwrap());
        assert!(assets[0].created_at >= before);
    }

    #[test]
    fn missing_url_is_resolution_failure() {
        let record = RawMediaRecord::new(RecordKind::Image, json!({ "id": "7_7" }));
        let err = resolve(&record).unwrap_err();
        assert!(err.to_string().contains("7_7"));
    }

    #[test]
    fn tags_extraction() {
        let tags = extract_tags("Sunset at the #beach with #friends_2017 #été #beach");
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["beach", "friends_2017", "été"]
        );
    }

    #[test]
    fn tags_skip_html_entities() {
        let tags = extract_tags("it&#39;s a #test");
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["test"]);
    }

    #[test]
    fn tags_include_emoji() {
        let tags = extract_tags("#\u{1F525} and #love\u{2764}\u{FE0F} and #\u{1F44D}\u{1F3FD}");
        assert!(tags.contains("\u{1F525}"), "{tags:?}");
        assert!(tags.contains("love\u{2764}\u{FE0F}"), "{tags:?}");
        assert!(tags.contains("\u{1F44D}\u{1F3FD}"), "{tags:?}");
    }

    #[test]
    fn tags_empty_for_plain_text() {
        assert!(extract_tags("no tags here # just a hash").is_empty());
    }
}
