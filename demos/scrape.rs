//! Command-line scrape example
//!
//! Usage: `cargo run --example scrape -- alice '#sunset' 'loc:212988663'`
//!
//! - a bare name scrapes that user
//! - `#tag` scrapes a hashtag
//! - `loc:<id>` scrapes a location
//!
//! Files go to `./downloads/<target>/`. Set `IG_LOGIN_USER` and `IG_LOGIN_PASS`
//! to log in (required for stories). Logging is controlled by `RUST_LOG`.

use instagram_scraper::config::{Credentials, MediaConfig, OutputConfig};
use instagram_scraper::{Config, Event, InstagramScraper, Target, run_with_shutdown};

fn parse_target(arg: &str) -> Target {
    if let Some(tag) = arg.strip_prefix('#') {
        Target::Hashtag(tag.to_string())
    } else if let Some(id) = arg.strip_prefix("loc:") {
        Target::Location(id.to_string())
    } else {
        Target::User(arg.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let targets: Vec<Target> = std::env::args().skip(1).map(|a| parse_target(&a)).collect();
    if targets.is_empty() {
        eprintln!("usage: scrape <user | #tag | loc:id>...");
        std::process::exit(2);
    }

    let credentials = match (std::env::var("IG_LOGIN_USER"), std::env::var("IG_LOGIN_PASS")) {
        (Ok(username), Ok(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let config = Config {
        targets,
        output: OutputConfig {
            destination: Some("downloads".into()),
            retain_username: true,
            media_metadata: true,
            ..Default::default()
        },
        media: MediaConfig {
            maximum: 50,
            ..Default::default()
        },
        credentials,
        ..Default::default()
    };

    let scraper = InstagramScraper::new(config).await?;

    let mut events = scraper.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::TargetStarted {
                    target,
                    destination,
                } => {
                    println!("▶ {} -> {}", target, destination.display());
                }
                Event::AssetDownloaded { target, file_name } => {
                    println!("  ✓ {}/{}", target, file_name);
                }
                Event::AssetFailed { url, error, .. } => {
                    println!("  ✗ {}: {}", url, error);
                }
                Event::TargetFinished {
                    target,
                    downloaded,
                    skipped,
                    failed,
                } => {
                    println!(
                        "■ {}: {} downloaded, {} skipped, {} failed",
                        target, downloaded, skipped, failed
                    );
                }
                Event::TargetFailed { target, error } => {
                    println!("✗ {}: {}", target, error);
                }
                _ => {}
            }
        }
    });

    let summary = run_with_shutdown(scraper).await;

    println!();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.failed_targets().count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
