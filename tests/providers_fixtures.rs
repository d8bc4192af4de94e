// tests/providers_fixtures.rs
//
// Reddit and TikTok sources over the bundled JSON fixtures, in fixture mode and
// over HTTP against a local server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use parking_lot::Mutex;

use viral_radar::ingest::providers::reddit::RedditSource;
use viral_radar::ingest::providers::tiktok::TikTokSource;
use viral_radar::ingest::providers::HttpSettings;
use viral_radar::ingest::types::Feed;
use viral_radar::ingest::{fetch_feed, fetch_timeout_for, sanitize_batch};
use viral_radar::retry::RetryPolicy;
use viral_radar::CandidateSource;

const REDDIT: &str = include_str!("fixtures/reddit_new.json");
const TIKTOK: &str = include_str!("fixtures/tiktok_search.json");
const TIKTOK_MIXED: &str = include_str!("fixtures/tiktok_mixed.json");

#[tokio::test]
async fn reddit_fixture_keeps_pain_posts() {
    let all = RedditSource::from_fixture(REDDIT).fetch("backpain", 25).await.unwrap();
    assert_eq!(all.len(), 4);

    let pain = RedditSource::from_fixture(REDDIT)
        .pain_only(true)
        .fetch("backpain", 25)
        .await
        .unwrap();
    let titles: Vec<&str> = pain.iter().map(|c| c.title()).collect();
    assert_eq!(pain.len(), 3, "{titles:?}");
    assert!(titles.iter().all(|t| !t.contains("photo thread")));

    assert_eq!(pain[0].field("category"), Some("Back Pain"));
    assert_eq!(pain[1].field("category"), Some("Neck Pain"));
    assert_eq!(pain[0].metric("comments"), 57.0);
}

#[tokio::test]
async fn tiktok_fixture_parses_mixed_shapes() {
    let items = TikTokSource::from_fixture(TIKTOK)
        .fetch("posture corrector", 20)
        .await
        .unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0].id, "https://www.tiktok.com/@ergo_finds/video/7412000000000000001");
    assert_eq!(items[0].metric("views"), 1_850_000.0);
    assert_eq!(items[1].metric("views"), 1_200_000.0);
    assert_eq!(items[1].metric("likes"), 85_300.0);
    assert_eq!(items[2].metric("views"), 640_000.0);
    assert_eq!(items[3].id, "https://www.tiktok.com/@sleepnerd/video/7412000000000000004");
    assert_eq!(items[3].metric("views"), 2_300.0);

    // The last item has neither id nor url.
    let (kept, malformed, duplicates) = sanitize_batch(items);
    assert_eq!(kept.len(), 4);
    assert_eq!(malformed, 1);
    assert_eq!(duplicates, 0);
}

#[tokio::test]
async fn tiktok_bad_item_is_malformed_not_fatal() {
    let items = TikTokSource::from_fixture(TIKTOK_MIXED)
        .fetch("massage gun", 20)
        .await
        .unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[0].metric("views"), 1_400_000.0);
    assert_eq!(items[0].metric("likes"), 96_000.0);
    assert_eq!(items[1].id, "https://www.tiktok.com/@neckcheck/video/7412000000000000102");
    assert_eq!(items[1].created_at.map(|t| t.timestamp()), Some(1_757_149_200));
    assert_eq!(items[3].metric("views"), 75_500.0);

    let (kept, malformed, _) = sanitize_batch(items);
    assert_eq!(malformed, 1);
    let ids: Vec<&str> = kept.iter().map(|c| c.id.as_str()).collect();
    assert!(ids.iter().all(|id| !id.contains("0103")), "{ids:?}");
    assert_eq!(kept.len(), 3);
}

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, HashMap<String, String>)>>>,
    failures_left: Arc<Mutex<u32>>,
}

async fn reddit_listing(
    State(seen): State<Seen>,
    Path(sub): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    seen.requests.lock().push((sub, q));
    let mut left = seen.failures_left.lock();
    if *left > 0 {
        *left -= 1;
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(REDDIT.to_string())
}

async fn tiktok_search(
    State(seen): State<Seen>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    seen.requests.lock().push(("search".into(), q));
    Err(StatusCode::FORBIDDEN)
}

async fn spawn(seen: Seen) -> String {
    let app = Router::new()
        .route("/r/{sub}/new.json", get(reddit_listing))
        .route("/api/search", get(tiktok_search))
        .with_state(seen);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn http_settings() -> HttpSettings {
    HttpSettings {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::no_delay(3),
        ..HttpSettings::default()
    }
}

#[tokio::test]
async fn reddit_http_retries_503_then_parses() {
    let seen = Seen::default();
    *seen.failures_left.lock() = 1;
    let base = spawn(seen.clone()).await;

    let src = RedditSource::http(&base, &http_settings()).unwrap();
    let posts = src.fetch("r/backpain", 2).await.unwrap();
    assert_eq!(posts.len(), 2);

    let reqs = seen.requests.lock();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[1].0, "backpain");
    assert_eq!(reqs[1].1.get("limit").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn tiktok_http_forbidden_is_source_unavailable_without_retry() {
    let seen = Seen::default();
    let base = spawn(seen.clone()).await;

    let src = TikTokSource::http(&format!("{base}/api/search"), &http_settings()).unwrap();
    let err = src.fetch("massage gun", 10).await.unwrap_err();
    assert_eq!(err.feed, "tiktok");
    assert_eq!(err.query, "massage gun");
    assert!(err.reason.contains("403"));

    let reqs = seen.requests.lock();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].1.get("keyword").map(String::as_str), Some("massage gun"));
    assert_eq!(reqs[0].1.get("count").map(String::as_str), Some("10"));
}

/// Accepts connections and never answers.
async fn spawn_silent() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn hung_endpoint_uses_every_attempt_before_giving_up() {
    let base = spawn_silent().await;
    let attempt = Duration::from_millis(200);
    let settings = HttpSettings {
        timeout: attempt,
        retry: RetryPolicy::no_delay(3).with_attempt_timeout(attempt),
        ..HttpSettings::default()
    };
    let feed = Feed::new(
        Arc::new(RedditSource::http(&base, &settings).unwrap()),
        vec!["backpain".into()],
        5,
    );

    let outcome = fetch_feed(&feed, &[], fetch_timeout_for(&settings.retry)).await;
    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    let reason = &outcome.errors[0].reason;
    assert!(reason.contains("after 3 attempt(s)"), "{reason}");
}
