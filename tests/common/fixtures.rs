//! Listing payloads shaped like the web endpoints' responses

use serde_json::{Value, json};

/// Creation time of the newest fixture post (2017-01-22T21:33:26Z)
pub const NEWEST_POST_TIME: i64 = 1_485_120_806;

/// Feed image item served as a sized rendition under `base`
pub fn feed_image(base: &str, id: &str, created: i64, file: &str) -> Value {
    json!({
        "id": id,
        "code": format!("code_{id}"),
        "type": "image",
        "created_time": created.to_string(),
        "caption": { "text": format!("post {id} #mirror") },
        "images": {
            "standard_resolution": { "url": format!("{base}/t51/s640x640/{file}?ig_cache=1") }
        }
    })
}

/// Feed video item
pub fn feed_video(base: &str, id: &str, created: i64, file: &str) -> Value {
    json!({
        "id": id,
        "type": "video",
        "created_time": created.to_string(),
        "videos": { "standard_resolution": { "url": format!("{base}/t50/{file}") } }
    })
}

/// One page of a user feed
pub fn user_page(items: Vec<Value>, more_available: bool) -> Value {
    json!({ "items": items, "more_available": more_available })
}

/// First page of a hashtag listing
pub fn hashtag_page(nodes: Vec<Value>, end_cursor: Option<&str>) -> Value {
    json!({
        "tag": {
            "media": {
                "nodes": nodes,
                "page_info": {
                    "has_next_page": end_cursor.is_some(),
                    "end_cursor": end_cursor
                }
            }
        }
    })
}

/// Image node from a hashtag or location listing
pub fn image_node(base: &str, id: &str, date: i64, file: &str) -> Value {
    json!({
        "id": id,
        "code": format!("code_{id}"),
        "date": date,
        "is_video": false,
        "caption": "golden hour #sunset #sky",
        "display_src": format!("{base}/t51/c0.135.1080.1080/{file}")
    })
}

/// Video node, whose URL needs a detail lookup by `code`
pub fn video_node(id: &str, code: &str, date: i64) -> Value {
    json!({ "id": id, "code": code, "date": date, "is_video": true })
}

/// Profile page HTML embedding the shared-data payload
pub fn profile_page(id: &str, profile_pic: &str) -> String {
    let data = json!({
        "entry_data": {
            "ProfilePage": [ { "user": { "id": id, "profile_pic_url_hd": profile_pic } } ]
        }
    });
    format!("<html><script type=\"text/javascript\">window._sharedData = {data};</script></html>")
}

/// Reel payload with one image story
pub fn story_reel(base: &str, file: &str, taken_at: i64) -> Value {
    json!({
        "items": [ {
            "id": "story1",
            "taken_at": taken_at,
            "image_versions2": { "candidates": [ { "url": format!("{base}/stories/{file}?se=7") } ] }
        } ]
    })
}
