// src/config/mod.rs
//! `config/radar.toml` plus secrets from the environment.
//!
//! Every field has a default except the `[[feeds]]` list, which needs at least one entry.
//! Channel credentials never live in the file; they are read from env vars when the
//! deliverer is built.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::analyze::ScoringConfig;
use crate::errors::ConfigurationError;
use crate::ingest::config::{clean_list, load_queries_from};
use crate::ingest::fetch_timeout_for;
use crate::ingest::providers::reddit::{self, RedditSource};
use crate::ingest::providers::tiktok::TikTokSource;
use crate::ingest::providers::HttpSettings;
use crate::ingest::types::{CandidateSource, Feed};
use crate::notify::discord::DiscordDeliverer;
use crate::notify::email::EmailDeliverer;
use crate::notify::slack::SlackDeliverer;
use crate::notify::stdout::StdoutDeliverer;
use crate::notify::telegram::{self, TelegramDeliverer};
use crate::notify::Deliverer;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::retry::{Backoff, RetryPolicy};
use crate::scheduler::Scheduler;
use crate::seen::SeenSet;
use crate::store::DeliveryLog;

pub const DEFAULT_CONFIG_PATH: &str = "config/radar.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RadarConfig {
    pub scheduler: SchedulerSection,
    pub pipeline: PipelineSection,
    pub scoring: ScoringConfig,
    pub seen: SeenSection,
    pub delivered_log: DeliveredLogSection,
    pub delivery: DeliverySection,
    pub http: HttpSection,
    /// Problem feed read for keywords only.
    pub context: Option<FeedSection>,
    pub feeds: Vec<FeedSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub interval_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval_secs: 6 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_per_cycle: usize,
    pub max_context_keywords: usize,
    /// Per-query timeout. Unset means the http retry budget plus a second.
    pub fetch_timeout_secs: Option<u64>,
    pub delivery_pause_ms: u64,
    pub duplicate_title_similarity: Option<f64>,
    pub topic_keywords: Vec<String>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let d = PipelineSettings::default();
        Self {
            max_per_cycle: d.max_per_cycle,
            max_context_keywords: d.max_context_keywords,
            fetch_timeout_secs: None,
            delivery_pause_ms: 0,
            duplicate_title_similarity: None,
            topic_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeenSection {
    pub path: PathBuf,
    /// Keep at most this many ids; oldest go first.
    pub capacity: Option<usize>,
}

impl Default for SeenSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/seen.tsv"),
            capacity: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveredLogSection {
    pub enabled: bool,
    pub path: PathBuf,
    /// Rows older than this many days are dropped after each cycle. Unset keeps everything.
    pub retain_days: Option<u64>,
}

impl Default for DeliveredLogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("data/delivered.tsv"),
            retain_days: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Telegram,
    Discord,
    Slack,
    Email,
    Stdout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    pub channel: Channel,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff: Backoff,
    pub attempt_timeout_secs: u64,
    pub telegram_api_base: String,
}

impl Default for DeliverySection {
    fn default() -> Self {
        let r = RetryPolicy::default();
        Self {
            channel: Channel::default(),
            max_attempts: r.max_attempts,
            base_delay_ms: r.base_delay.as_millis() as u64,
            backoff: r.backoff,
            attempt_timeout_secs: r.attempt_timeout.as_secs(),
            telegram_api_base: telegram::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl DeliverySection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff: self.backoff,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        let d = HttpSettings::default();
        Self {
            user_agent: d.user_agent,
            timeout_secs: d.timeout.as_secs(),
            max_attempts: d.retry.max_attempts,
            base_delay_ms: d.retry.base_delay.as_millis() as u64,
        }
    }
}

impl HttpSection {
    pub fn settings(&self) -> HttpSettings {
        let timeout = Duration::from_secs(self.timeout_secs);
        HttpSettings {
            user_agent: self.user_agent.clone(),
            timeout,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
                backoff: Backoff::Exponential,
                attempt_timeout: timeout,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Reddit,
    Tiktok,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedSection {
    pub kind: FeedKind,
    /// Reddit host or TikTok search endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Serve this JSON document instead of calling the network.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default)]
    pub queries: Vec<String>,
    /// TOML (`queries = [...]`) or JSON array; merged after `queries`.
    #[serde(default)]
    pub queries_file: Option<PathBuf>,
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
    #[serde(default)]
    pub follow_context: bool,
    /// Reddit only: keep posts that describe a pain point.
    #[serde(default)]
    pub pain_only: bool,
    /// Context feed only: ignore posts older than this. Defaults to a week.
    #[serde(default)]
    pub max_age_hours: Option<u64>,
}

fn default_feed_limit() -> usize {
    25
}

pub const DEFAULT_CONTEXT_MAX_AGE_HOURS: u64 = 7 * 24;

impl RadarConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigurationError> {
        let mut cfg: RadarConfig =
            toml::from_str(raw).map_err(|e| ConfigurationError::new(e.to_string()))?;
        cfg.pipeline.topic_keywords = clean_list(std::mem::take(&mut cfg.pipeline.topic_keywords));
        for feed in cfg.context.iter_mut().chain(cfg.feeds.iter_mut()) {
            feed.queries = clean_list(std::mem::take(&mut feed.queries));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigurationError::new("scheduler.interval_secs must be > 0"));
        }
        if let Some(secs) = self.pipeline.fetch_timeout_secs {
            let needed = fetch_timeout_for(&self.http.settings().retry);
            if Duration::from_secs(secs) < needed {
                return Err(ConfigurationError::new(format!(
                    "pipeline.fetch_timeout_secs = {secs} cuts the http retry budget short; \
                     use at least {}s or leave it unset",
                    needed.as_secs_f64().ceil()
                )));
            }
        }
        if let Some(t) = self.pipeline.duplicate_title_similarity {
            if !(t > 0.0 && t <= 1.0) {
                return Err(ConfigurationError::new(
                    "pipeline.duplicate_title_similarity must be in (0, 1]",
                ));
            }
        }
        let s = &self.scoring;
        let w = &s.weights;
        if [w.primary, w.secondary, w.keywords]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigurationError::new("scoring.weights must be finite and >= 0"));
        }
        if [s.primary_scale, s.secondary_scale, s.keyword_k, s.min_threshold]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigurationError::new(
                "scoring scales and threshold must be finite and >= 0",
            ));
        }
        if s.primary_metric.trim().is_empty() {
            return Err(ConfigurationError::new("scoring.primary_metric is empty"));
        }
        if self.delivery.max_attempts == 0 || self.http.max_attempts == 0 {
            return Err(ConfigurationError::new("max_attempts must be >= 1"));
        }
        if self.delivery.attempt_timeout_secs == 0 || self.http.timeout_secs == 0 {
            return Err(ConfigurationError::new("timeouts must be > 0"));
        }
        if self.feeds.is_empty() {
            return Err(ConfigurationError::new("at least one [[feeds]] entry is required"));
        }
        for (i, f) in self.feeds.iter().enumerate() {
            if f.limit == 0 {
                return Err(ConfigurationError::new(format!("feeds[{i}].limit must be > 0")));
            }
            if f.queries.is_empty() && f.queries_file.is_none() && !f.follow_context {
                return Err(ConfigurationError::new(format!(
                    "feeds[{i}] has no queries and does not follow context"
                )));
            }
            if f.max_age_hours.is_some() {
                return Err(ConfigurationError::new(format!(
                    "feeds[{i}].max_age_hours is only read on [context]; use scoring.max_age_hours"
                )));
            }
        }
        if let Some(c) = &self.context {
            if c.kind != FeedKind::Reddit {
                return Err(ConfigurationError::new("context feed must be reddit"));
            }
            if c.queries.is_empty() && c.queries_file.is_none() {
                return Err(ConfigurationError::new("context feed needs subreddits"));
            }
            if c.max_age_hours == Some(0) {
                return Err(ConfigurationError::new("context.max_age_hours must be > 0"));
            }
        }
        if self.delivered_log.retain_days == Some(0) {
            return Err(ConfigurationError::new("delivered_log.retain_days must be > 0"));
        }
        Ok(())
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(Duration::from_secs(self.scheduler.interval_secs))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let p = &self.pipeline;
        PipelineSettings {
            max_per_cycle: p.max_per_cycle,
            max_context_keywords: p.max_context_keywords,
            fetch_timeout: match p.fetch_timeout_secs {
                Some(secs) => Duration::from_secs(secs),
                None => fetch_timeout_for(&self.http.settings().retry),
            },
            delivery_pause: Duration::from_millis(p.delivery_pause_ms),
            duplicate_title_similarity: p.duplicate_title_similarity,
            topic_keywords: p.topic_keywords.clone(),
        }
    }

    pub fn build_feed(&self, section: &FeedSection) -> Result<Feed, ConfigurationError> {
        let mut queries = section.queries.clone();
        if let Some(file) = &section.queries_file {
            let extra = load_queries_from(file)
                .map_err(|e| ConfigurationError::new(format!("{e:#}")))?;
            queries.extend(extra);
            queries = clean_list(queries);
        }

        let fixture = match &section.fixture {
            Some(p) => Some(std::fs::read_to_string(p).map_err(|e| {
                ConfigurationError::new(format!("reading fixture {}: {e}", p.display()))
            })?),
            None => None,
        };
        let http = self.http.settings();

        let source: Arc<dyn CandidateSource> = match section.kind {
            FeedKind::Reddit => {
                let src = match &fixture {
                    Some(doc) => RedditSource::from_fixture(doc),
                    None => RedditSource::http(
                        section.endpoint.as_deref().unwrap_or(reddit::DEFAULT_BASE_URL),
                        &http,
                    )?,
                };
                Arc::new(src.pain_only(section.pain_only))
            }
            FeedKind::Tiktok => match &fixture {
                Some(doc) => Arc::new(TikTokSource::from_fixture(doc)),
                None => Arc::new(TikTokSource::http(
                    section.endpoint.as_deref().unwrap_or_default(),
                    &http,
                )?),
            },
        };

        let feed = Feed::new(source, queries, section.limit);
        Ok(if section.follow_context {
            feed.following_context()
        } else {
            feed
        })
    }

    /// Channel selected by `[delivery] channel`, credentials from the environment.
    pub fn build_deliverer(&self) -> Result<Arc<dyn Deliverer>, ConfigurationError> {
        let retry = self.delivery.retry_policy();
        let d: Arc<dyn Deliverer> = match self.delivery.channel {
            Channel::Telegram => Arc::new(
                TelegramDeliverer::from_env()?
                    .with_api_base(&self.delivery.telegram_api_base)
                    .with_retry(retry),
            ),
            Channel::Discord => Arc::new(DiscordDeliverer::from_env()?.with_retry(retry)),
            Channel::Slack => Arc::new(SlackDeliverer::from_env()?.with_retry(retry)),
            Channel::Email => Arc::new(EmailDeliverer::from_env()?.with_retry(retry)),
            Channel::Stdout => Arc::new(StdoutDeliverer),
        };
        Ok(d)
    }

    /// Everything wired up: feeds, channel, seen set and delivered log.
    pub async fn build_pipeline(&self) -> anyhow::Result<Pipeline> {
        let deliverer = self.build_deliverer()?;
        self.build_pipeline_with(deliverer).await
    }

    /// Same as [`build_pipeline`](Self::build_pipeline) with an explicit channel.
    pub async fn build_pipeline_with(&self, deliverer: Arc<dyn Deliverer>) -> anyhow::Result<Pipeline> {
        let seen = SeenSet::open_file(&self.seen.path, self.seen.capacity)
            .await
            .context("loading seen set")?;
        tracing::info!(target: "config", seen = seen.len(), path = %self.seen.path.display(), "seen set ready");

        let mut pipeline = Pipeline::new(
            crate::analyze::Scorer::new(self.scoring.clone()),
            deliverer,
            seen,
        )
        .with_settings(self.pipeline_settings());

        if let Some(ctx) = &self.context {
            let hours = ctx.max_age_hours.unwrap_or(DEFAULT_CONTEXT_MAX_AGE_HOURS);
            let feed = self
                .build_feed(ctx)?
                .with_max_age(chrono::Duration::hours(hours as i64));
            pipeline = pipeline.with_context(feed);
        }
        for f in &self.feeds {
            pipeline = pipeline.with_feed(self.build_feed(f)?);
        }
        if self.delivered_log.enabled {
            let mut log = DeliveryLog::file(&self.delivered_log.path);
            if let Some(days) = self.delivered_log.retain_days {
                log = log.with_retention(chrono::Duration::days(days as i64));
            }
            pipeline = pipeline.with_log(log);
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[feeds]]
        kind = "tiktok"
        endpoint = "https://search.example/api"
        queries = ["posture corrector", " Posture Corrector ", ""]
    "#;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = RadarConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.scheduler.interval_secs, 21_600);
        assert_eq!(cfg.pipeline.max_per_cycle, 10);
        assert_eq!(cfg.scoring.primary_metric, "views");
        assert_eq!(cfg.delivery.channel, Channel::Telegram);
        assert_eq!(cfg.feeds[0].limit, 25);
        assert_eq!(cfg.feeds[0].queries, vec!["posture corrector"]);
        assert!(cfg.context.is_none());
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        assert!(RadarConfig::from_toml_str("").is_err());

        let bad = format!("{MINIMAL}\n[scheduler]\ninterval_secs = 0\n");
        assert!(RadarConfig::from_toml_str(&bad).is_err());

        let bad = format!("{MINIMAL}\n[pipeline]\nduplicate_title_similarity = 1.5\n");
        assert!(RadarConfig::from_toml_str(&bad).is_err());

        let bad = format!("{MINIMAL}\n[scoring.weights]\nprimary = -1.0\n");
        assert!(RadarConfig::from_toml_str(&bad).is_err());

        let bad = format!("{MINIMAL}\n[context]\nkind = \"tiktok\"\nqueries = [\"x\"]\n");
        assert!(RadarConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn fetch_timeout_covers_the_http_retry_budget() {
        let cfg = RadarConfig::from_toml_str(MINIMAL).unwrap();
        let budget = cfg.http.settings().retry.worst_case();
        let derived = cfg.pipeline_settings().fetch_timeout;
        assert!(derived > budget, "{derived:?} <= {budget:?}");

        // 3 x 20s attempts plus backoff do not fit in 30s.
        let short = format!("{MINIMAL}\n[pipeline]\nfetch_timeout_secs = 30\n");
        let err = RadarConfig::from_toml_str(&short).unwrap_err();
        assert!(err.to_string().contains("fetch_timeout_secs"), "{err}");

        let zero = format!("{MINIMAL}\n[pipeline]\nfetch_timeout_secs = 0\n");
        assert!(RadarConfig::from_toml_str(&zero).is_err());

        let fits = format!(
            "{MINIMAL}\n[pipeline]\nfetch_timeout_secs = 10\n[http]\ntimeout_secs = 2\nmax_attempts = 3\nbase_delay_ms = 100\n"
        );
        let cfg = RadarConfig::from_toml_str(&fits).unwrap();
        assert_eq!(cfg.pipeline_settings().fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad = format!("typo_section = 1\n{MINIMAL}");
        assert!(RadarConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn delivery_section_maps_to_retry_policy() {
        let raw = format!(
            "{MINIMAL}\n[delivery]\nchannel = \"stdout\"\nmax_attempts = 5\nbase_delay_ms = 100\nbackoff = \"fixed\"\n"
        );
        let cfg = RadarConfig::from_toml_str(&raw).unwrap();
        let p = cfg.delivery.retry_policy();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.base_delay, Duration::from_millis(100));
        assert_eq!(p.backoff, Backoff::Fixed);
        assert_eq!(cfg.build_deliverer().unwrap().channel(), "stdout");
    }

    #[test]
    fn context_age_and_log_retention() {
        let raw = format!(
            "{MINIMAL}\n[context]\nkind = \"reddit\"\nfixture = \"tests/fixtures/reddit_new.json\"\nqueries = [\"backpain\"]\n\n[delivered_log]\nenabled = false\nretain_days = 30\n"
        );
        let cfg = RadarConfig::from_toml_str(&raw).unwrap();
        assert_eq!(cfg.delivered_log.retain_days, Some(30));
        assert_eq!(cfg.context.as_ref().and_then(|c| c.max_age_hours), None);

        let bad = format!("{MINIMAL}max_age_hours = 24\n");
        let err = RadarConfig::from_toml_str(&bad).unwrap_err();
        assert!(err.to_string().contains("max_age_hours"), "{err}");

        let bad = format!("{MINIMAL}\n[delivered_log]\nretain_days = 0\n");
        assert!(RadarConfig::from_toml_str(&bad).is_err());
    }
}
