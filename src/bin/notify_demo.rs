//! Demo that sends one sample match through the configured channel.
//!
//!     notify-demo [config/radar.toml]

use std::path::PathBuf;

use chrono::Utc;
use viral_radar::notify::render_message;
use viral_radar::{init_tracing, Candidate, RadarConfig, ScoredCandidate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(viral_radar::config::DEFAULT_CONFIG_PATH));
    let cfg = RadarConfig::load(&path)?;
    let deliverer = cfg.build_deliverer()?;

    let sample = Candidate::new("https://www.tiktok.com/@viral_radar/video/1", "tiktok")
        .with_created_at(Utc::now())
        .with_metric("views", 1_234_567.0)
        .with_metric("likes", 89_000.0)
        .with_field("title", "Demo: lumbar cushion that fixed my desk back pain")
        .with_field("author", "viral_radar")
        .with_field("url", "https://www.tiktok.com/@viral_radar/video/1")
        .with_field("query", "lumbar cushion");
    let message = render_message(&ScoredCandidate::included(sample, 0.87));

    match deliverer.deliver(&message).await {
        Ok(()) => println!("notify-demo: sent via {}", deliverer.channel()),
        Err(e) => {
            eprintln!("notify-demo: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
