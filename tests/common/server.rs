//! Mock Instagram server and scraper configuration helpers

use instagram_scraper::config::{Endpoints, NetworkConfig, OutputConfig, RetryConfig};
use instagram_scraper::{Config, Target};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scraper configuration pointing every endpoint at `server`
pub fn config_for(server: &MockServer, destination: &Path, targets: Vec<Target>) -> Config {
    Config {
        targets,
        output: OutputConfig {
            destination: Some(destination.to_path_buf()),
            retain_username: true,
            ..Default::default()
        },
        network: NetworkConfig {
            concurrency: 4,
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(20),
                ..Default::default()
            },
            endpoints: Endpoints {
                base_url: format!("{}/", server.uri()),
                stories_base_url: format!("{}/api/v1/feed/user/", server.uri()),
            },
        },
        ..Default::default()
    }
}

/// Serve a user feed page; `max_id` selects a continuation page
pub async fn mount_user_page(server: &MockServer, user: &str, max_id: Option<&str>, body: Value) {
    let mock = Mock::given(method("GET")).and(path(format!("/{user}/media/")));
    match max_id {
        Some(id) => {
            mock.and(query_param("max_id", id))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .with_priority(1)
                .mount(server)
                .await;
        }
        None => {
            mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(server)
                .await;
        }
    }
}

/// Serve `body` at the normalized asset path `route`
pub async fn mount_asset(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Number of requests the server received for `route`
pub async fn request_count(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

/// Regular files under `dir`, sorted by name
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Names of the regular files under `dir`, sorted
pub fn file_names_in(dir: &Path) -> Vec<String> {
    files_in(dir)
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}
