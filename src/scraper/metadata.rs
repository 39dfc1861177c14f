//! JSON metadata sidecar

use crate::error::{Error, Result};
use crate::types::Asset;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Copy of `record` with the resolved asset URLs and tags attached.
pub(crate) fn annotate(record: &Value, assets: &[Asset]) -> Value {
    let mut annotated = record.clone();
    if let Value::Object(obj) = &mut annotated {
        let urls: Vec<Value> = assets.iter().map(|a| Value::String(a.url.clone())).collect();
        let tags: Vec<Value> = assets
            .first()
            .map(|a| a.tags.iter().cloned().map(Value::String).collect())
            .unwrap_or_default();
        obj.insert("urls".to_string(), Value::Array(urls));
        obj.insert("tags".to_string(), Value::Array(tags));
    }
    annotated
}

/// Write `records` as one indented JSON array with sorted keys to `<dir>/<name>.json`.
pub async fn save_metadata(dir: &Path, name: &str, records: &[Value]) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.json"));
    let sorted = Value::Array(records.iter().cloned().map(sort_keys).collect());
    let body = serde_json::to_vec_pretty(&sorted)?;

    tokio::fs::write(&path, body).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write metadata '{}': {}", path.display(), e),
        ))
    })?;
    tracing::debug!(path = %path.display(), records = records.len(), "Saved metadata");
    Ok(path)
}

/// Rebuild objects with keys in lexical order, whatever map ordering serde_json uses
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut entries: Vec<(String, Value)> = obj.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn annotate_adds_urls_and_tags() {
        let asset = |url: &str| Asset {
            url: url.to_string(),
            created_at: 1,
            tags: ["beach".to_string(), "sun".to_string()].into_iter().collect(),
            kind: MediaKind::Image,
        };
        let record = json!({ "id": "1", "type": "carousel" });

        let annotated = annotate(
            &record,
            &[asset("https://cdn.example.com/a.jpg"), asset("https://cdn.example.com/b.jpg")],
        );

        assert_eq!(
            annotated["urls"],
            json!(["https://cdn.example.com/a.jpg", "https://cdn.example.com/b.jpg"])
        );
        assert_eq!(annotated["tags"], json!(["beach", "sun"]));
        assert_eq!(annotated["id"], "1");
    }

    #[tokio::test]
    async fn sidecar_is_sorted_indented_array() {
        let dir = tempdir().unwrap();
        let records = vec![
            json!({ "zeta": 1, "alpha": { "y": 2, "b": 3 } }),
            json!({ "id": "2" }),
        ];

        let path = save_metadata(dir.path(), "alice", &records).await.unwrap();

        assert_eq!(path, dir.path().join("alice.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n"), "indented array: {text}");
        let alpha = text.find("\"alpha\"").unwrap();
        let zeta = text.find("\"zeta\"").unwrap();
        assert!(alpha < zeta, "keys sorted: {text}");
        assert!(text.find("\"b\"").unwrap() < text.find("\"y\"").unwrap());

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }
}
