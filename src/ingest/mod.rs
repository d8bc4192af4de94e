// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod types;

use crate::candidate::Candidate;
use crate::errors::SourceUnavailable;
use crate::ingest::types::Feed;
use crate::retry::RetryPolicy;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("radar_fetched_total", "Candidates returned by sources.");
        describe_counter!(
            "radar_malformed_total",
            "Candidates dropped for a missing id."
        );
        describe_counter!(
            "radar_source_errors_total",
            "Source fetches that failed or timed out."
        );
        describe_histogram!("radar_fetch_ms", "Per-query fetch time in milliseconds.");
        describe_histogram!("radar_parse_ms", "Response parse time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

/// Everything a group of feeds produced in one cycle.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub candidates: Vec<Candidate>,
    pub errors: Vec<SourceUnavailable>,
    pub fetched: usize,
}

impl FetchOutcome {
    fn merge(&mut self, other: FetchOutcome) {
        self.candidates.extend(other.candidates);
        self.errors.extend(other.errors);
        self.fetched += other.fetched;
    }
}

/// Headroom on top of a source's own retry budget before the per-query timeout fires.
pub const FETCH_TIMEOUT_SLACK: Duration = Duration::from_secs(1);

/// Per-query timeout that lets a source with `retry` use all of its attempts.
pub fn fetch_timeout_for(retry: &RetryPolicy) -> Duration {
    retry.worst_case() + FETCH_TIMEOUT_SLACK
}

/// Run every query of one feed in order. A failing query is recorded and skipped.
pub async fn fetch_feed(feed: &Feed, extra_queries: &[String], timeout: Duration) -> FetchOutcome {
    ensure_metrics_described();

    let mut queries: Vec<&str> = feed.queries.iter().map(String::as_str).collect();
    if feed.follow_context {
        for q in extra_queries {
            if !queries.contains(&q.as_str()) {
                queries.push(q);
            }
        }
    }

    let mut out = FetchOutcome::default();
    for q in queries {
        let t0 = Instant::now();
        let res = tokio::time::timeout(timeout, feed.source.fetch(q, feed.limit)).await;
        metrics::histogram!("radar_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match res {
            Ok(Ok(mut items)) => {
                tracing::debug!(target: "ingest", feed = feed.name(), query = q, n = items.len(), "fetched");
                out.fetched += items.len();
                out.candidates.append(&mut items);
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "ingest", error = %e, feed = feed.name(), "source error");
                counter!("radar_source_errors_total").increment(1);
                out.errors.push(e);
            }
            Err(_) => {
                let e = SourceUnavailable::new(
                    feed.name(),
                    q,
                    format!("timed out after {}s", timeout.as_secs_f32()),
                );
                tracing::warn!(target: "ingest", error = %e, feed = feed.name(), "source timeout");
                counter!("radar_source_errors_total").increment(1);
                out.errors.push(e);
            }
        }
    }
    counter!("radar_fetched_total").increment(out.fetched as u64);
    out
}

/// Fetch all feeds concurrently. Results are merged in feed order, so the batch
/// order does not depend on which fetch finished first.
pub async fn fetch_all(feeds: &[Feed], extra_queries: &[String], timeout: Duration) -> FetchOutcome {
    let outcomes = futures::future::join_all(
        feeds
            .iter()
            .map(|f| fetch_feed(f, extra_queries, timeout)),
    )
    .await;

    let mut all = FetchOutcome::default();
    for o in outcomes {
        all.merge(o);
    }
    all
}

/// Drop candidates without an id and repeated ids (first occurrence wins).
/// Returns (kept, malformed, duplicates).
pub fn sanitize_batch(raw: Vec<Candidate>) -> (Vec<Candidate>, usize, usize) {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(raw.len());
    let mut malformed = 0usize;
    let mut duplicates = 0usize;

    for mut c in raw {
        if !c.has_valid_id() {
            malformed += 1;
            continue;
        }
        c.id = c.id.trim().to_string();
        if !seen_ids.insert(c.id.clone()) {
            duplicates += 1;
            continue;
        }
        keep.push(c);
    }

    if malformed > 0 {
        tracing::warn!(target: "ingest", malformed, "dropped candidates without id");
        counter!("radar_malformed_total").increment(malformed as u64);
    }
    (keep, malformed, duplicates)
}
