// src/pipeline.rs
//! One polling cycle: fetch → filter → rank → deliver → persist.
//!
//! Every failure inside a cycle is recorded in the [`CycleReport`] and the cycle keeps
//! going; a report is produced even when nothing was delivered.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analyze::{context_keywords, rank, suppress_similar_titles, Scorer, ScoringContext};
use crate::candidate::{Exclusion, ScoredCandidate};
use crate::errors::CycleError;
use crate::ingest::types::Feed;
use crate::ingest::providers::HttpSettings;
use crate::ingest::{fetch_all, fetch_feed, fetch_timeout_for, sanitize_batch};
use crate::notify::{render_message, Deliverer};
use crate::seen::SeenSet;
use crate::shutdown::Shutdown;
use crate::store::{DeliveryLog, Row};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("radar_cycles_total", "Completed pipeline cycles.");
        describe_counter!("radar_delivered_total", "Messages accepted by the channel.");
        describe_counter!(
            "radar_delivery_errors_total",
            "Delivery attempts that failed after retries."
        );
        describe_counter!(
            "radar_persistence_errors_total",
            "Seen-set or delivered-log writes that failed."
        );
        describe_histogram!("radar_cycle_ms", "Wall time of one cycle in milliseconds.");
        describe_gauge!(
            "radar_last_cycle_ts",
            "Unix timestamp of the last finished cycle."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    Fetching,
    Filtering,
    Ranking,
    Delivering,
    Persisting,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on delivery attempts per cycle.
    pub max_per_cycle: usize,
    pub max_context_keywords: usize,
    /// Per query; should cover the source's whole retry budget.
    pub fetch_timeout: Duration,
    pub delivery_pause: Duration,
    /// Normalized Levenshtein similarity at which a lower-ranked title is dropped.
    pub duplicate_title_similarity: Option<f64>,
    /// Always searched and scored, ahead of the keywords found in the context feed.
    pub topic_keywords: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_per_cycle: 10,
            max_context_keywords: 10,
            fetch_timeout: fetch_timeout_for(&HttpSettings::default().retry),
            delivery_pause: Duration::ZERO,
            duplicate_title_similarity: None,
            topic_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Problem posts read from the context feed.
    pub context_posts: usize,
    pub context_keywords: Vec<String>,
    pub fetched: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub filtered_seen: usize,
    pub filtered_stale: usize,
    pub filtered_below_threshold: usize,
    pub filtered_similar: usize,
    pub eligible: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub delivered_ids: Vec<String>,
    /// Delivered-log rows dropped for being older than the retention window.
    pub log_rows_pruned: usize,
    pub stopped: bool,
    pub errors: Vec<CycleError>,
}

impl CycleReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Pipeline {
    scorer: Scorer,
    deliverer: Arc<dyn Deliverer>,
    seen: SeenSet,
    context: Option<Feed>,
    feeds: Vec<Feed>,
    log: Option<DeliveryLog>,
    settings: PipelineSettings,
    clock: Clock,
    stage: CycleStage,
}

/// The scheduler and the HTTP API share one pipeline; the mutex keeps cycles sequential.
pub type SharedPipeline = Arc<tokio::sync::Mutex<Pipeline>>;

impl Pipeline {
    pub fn new(scorer: Scorer, deliverer: Arc<dyn Deliverer>, seen: SeenSet) -> Self {
        Self {
            scorer,
            deliverer,
            seen,
            context: None,
            feeds: Vec::new(),
            log: None,
            settings: PipelineSettings::default(),
            clock: Arc::new(Utc::now),
            stage: CycleStage::Idle,
        }
    }

    /// Add a content feed; its candidates are scored and delivered.
    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.feeds.push(feed);
        self
    }

    /// Problem feed read only for keywords.
    pub fn with_context(mut self, feed: Feed) -> Self {
        self.context = Some(feed);
        self
    }

    pub fn with_log(mut self, log: DeliveryLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_shared(self) -> SharedPipeline {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    pub fn delivery_log(&self) -> Option<&DeliveryLog> {
        self.log.as_ref()
    }

    pub fn channel(&self) -> &str {
        self.deliverer.channel()
    }

    fn enter(&mut self, stage: CycleStage) {
        self.stage = stage;
        tracing::debug!(target: "pipeline", ?stage, "stage");
    }

    pub async fn run_cycle(&mut self, stop: &Shutdown) -> CycleReport {
        ensure_metrics_described();
        let t0 = Instant::now();
        let now = (self.clock)();
        let mut report = CycleReport {
            started_at: Some(Utc::now()),
            ..CycleReport::default()
        };

        // Fetching
        self.enter(CycleStage::Fetching);
        let keywords = self.gather_keywords(now, &mut report).await;
        let outcome = fetch_all(&self.feeds, &keywords, self.settings.fetch_timeout).await;
        report.fetched = outcome.fetched;
        report
            .errors
            .extend(outcome.errors.into_iter().map(CycleError::from));

        // Filtering
        self.enter(CycleStage::Filtering);
        let (batch, malformed, duplicates) = sanitize_batch(outcome.candidates);
        report.malformed = malformed;
        report.duplicates = duplicates;

        let ctx = ScoringContext::new(now).with_keywords(&keywords);
        let mut scored: Vec<ScoredCandidate> = Vec::with_capacity(batch.len());
        for c in batch {
            let s = self.scorer.evaluate(c, &ctx, &self.seen);
            match s.exclusion {
                Some(Exclusion::Seen) => report.filtered_seen += 1,
                Some(Exclusion::Stale) => report.filtered_stale += 1,
                Some(Exclusion::BelowThreshold) => report.filtered_below_threshold += 1,
                None => {}
            }
            scored.push(s);
        }

        // Ranking
        self.enter(CycleStage::Ranking);
        let mut ranked = rank(scored, &self.scorer.config().tiebreak_metric, now);
        if let Some(threshold) = self.settings.duplicate_title_similarity {
            let (kept, dropped) = suppress_similar_titles(ranked, threshold);
            ranked = kept;
            report.filtered_similar = dropped;
        }
        report.eligible = ranked.len();

        // Delivering
        self.enter(CycleStage::Delivering);
        let rows = self.deliver_ranked(&ranked, stop, &mut report).await;

        // Persisting
        self.enter(CycleStage::Persisting);
        self.persist(rows, now, &mut report).await;

        self.enter(CycleStage::Idle);
        let elapsed = t0.elapsed();
        let finished = Utc::now();
        report.finished_at = Some(finished);
        report.duration_ms = elapsed.as_millis() as u64;

        counter!("radar_cycles_total").increment(1);
        histogram!("radar_cycle_ms").record(elapsed.as_secs_f64() * 1_000.0);
        gauge!("radar_last_cycle_ts").set(finished.timestamp() as f64);

        tracing::info!(
            target: "pipeline",
            fetched = report.fetched,
            eligible = report.eligible,
            attempted = report.attempted,
            delivered = report.delivered,
            errors = report.errors.len(),
            stopped = report.stopped,
            ms = report.duration_ms,
            "cycle finished"
        );
        report
    }

    /// Topic keywords first, then keywords from the context feed, de-duplicated.
    /// Context posts older than the feed's `max_age` are ignored.
    async fn gather_keywords(&self, now: DateTime<Utc>, report: &mut CycleReport) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for k in &self.settings.topic_keywords {
            let k = k.trim().to_lowercase();
            if !k.is_empty() && !keywords.contains(&k) {
                keywords.push(k);
            }
        }

        if let Some(ctx_feed) = &self.context {
            let outcome = fetch_feed(ctx_feed, &[], self.settings.fetch_timeout).await;
            report
                .errors
                .extend(outcome.errors.into_iter().map(CycleError::from));
            let (mut posts, _, _) = sanitize_batch(outcome.candidates);
            if let Some(max_age) = ctx_feed.max_age {
                let cutoff = now - max_age;
                let before = posts.len();
                posts.retain(|p| p.effective_created_at(now) >= cutoff);
                if posts.len() < before {
                    tracing::debug!(target: "pipeline", dropped = before - posts.len(), "old context posts ignored");
                }
            }
            report.context_posts = posts.len();
            for k in context_keywords(&posts, self.settings.max_context_keywords) {
                if !keywords.contains(&k) {
                    keywords.push(k);
                }
            }
        }

        tracing::debug!(target: "pipeline", keywords = ?keywords, "context keywords");
        report.context_keywords = keywords.clone();
        keywords
    }

    async fn deliver_ranked(
        &mut self,
        ranked: &[ScoredCandidate],
        stop: &Shutdown,
        report: &mut CycleReport,
    ) -> Vec<Row> {
        let mut rows = Vec::new();
        for (i, item) in ranked.iter().take(self.settings.max_per_cycle).enumerate() {
            if i > 0 && !self.settings.delivery_pause.is_zero() {
                tokio::time::sleep(self.settings.delivery_pause).await;
            }
            if stop.is_requested() {
                tracing::info!(target: "pipeline", remaining = report.eligible.min(self.settings.max_per_cycle) - i, "stop requested, skipping remaining deliveries");
                report.stopped = true;
                break;
            }

            report.attempted += 1;
            let message = render_message(item);
            match self.deliverer.deliver(&message).await {
                Ok(()) => {
                    self.seen.add(item.id());
                    report.delivered += 1;
                    report.delivered_ids.push(item.id().to_string());
                    rows.push(DeliveryLog::row_for(item, Utc::now()));
                    counter!("radar_delivered_total").increment(1);
                    tracing::info!(target: "pipeline", id = %item.id(), score = item.score, channel = self.deliverer.channel(), "delivered");
                }
                Err(error) => {
                    counter!("radar_delivery_errors_total").increment(1);
                    tracing::warn!(target: "pipeline", id = %item.id(), error = %error, "delivery failed");
                    report.errors.push(CycleError::Delivery {
                        candidate_id: item.id().to_string(),
                        error,
                    });
                }
            }
        }
        rows
    }

    async fn persist(&mut self, rows: Vec<Row>, now: DateTime<Utc>, report: &mut CycleReport) {
        if let Err(e) = self.seen.flush().await {
            counter!("radar_persistence_errors_total").increment(1);
            tracing::error!(target: "pipeline", error = %e, pending = self.seen.pending(), "seen set flush failed");
            report.errors.push(e.into());
        }

        let Some(log) = &self.log else {
            return;
        };
        if !rows.is_empty() {
            if let Err(e) = log.append(&rows).await {
                counter!("radar_persistence_errors_total").increment(1);
                tracing::error!(target: "pipeline", error = %e, "delivered log append failed");
                report.errors.push(e.into());
            }
        }
        match log.prune(now).await {
            Ok(n) => report.log_rows_pruned = n,
            Err(e) => {
                counter!("radar_persistence_errors_total").increment(1);
                tracing::error!(target: "pipeline", error = %e, "delivered log prune failed");
                report.errors.push(e.into());
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::scheduler::CycleRunner for SharedPipeline {
    async fn run_cycle(&self, stop: &Shutdown) -> anyhow::Result<CycleReport> {
        let mut pipeline = self.lock().await;
        Ok(pipeline.run_cycle(stop).await)
    }
}
