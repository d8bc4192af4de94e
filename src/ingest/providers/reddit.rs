// src/ingest/providers/reddit.rs
//! Problem feed: newest posts of a subreddit via the public listing JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use reqwest::Client;
use serde::Deserialize;

use super::{build_client, get_text, HttpSettings};
use crate::analyze::keywords::{is_pain_related, problem_category};
use crate::candidate::Candidate;
use crate::errors::{ConfigurationError, SourceUnavailable};
use crate::ingest::normalize_text;
use crate::ingest::types::CandidateSource;
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const TEXT_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_utc: f64,
    author: Option<String>,
    #[serde(default)]
    subreddit: String,
}

pub struct RedditSource {
    mode: Mode,
    pain_only: bool,
}

enum Mode {
    // Own copy of the document so tests don't need 'static data.
    Fixture(String),
    Http {
        base_url: String,
        client: Client,
        retry: RetryPolicy,
    },
}

impl RedditSource {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
            pain_only: false,
        }
    }

    pub fn http(base_url: &str, settings: &HttpSettings) -> Result<Self, ConfigurationError> {
        Ok(Self {
            mode: Mode::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                client: build_client(settings)?,
                retry: settings.retry,
            },
            pain_only: false,
        })
    }

    /// Keep only posts that read like someone describing a pain point.
    pub fn pain_only(mut self, on: bool) -> Self {
        self.pain_only = on;
        self
    }

    fn parse_listing(&self, body: &str, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceUnavailable> {
        let t0 = std::time::Instant::now();
        let listing: Listing = serde_json::from_str(body)
            .map_err(|e| SourceUnavailable::new(self.name(), query, format!("parsing listing: {e}")))?;

        let mut out = Vec::with_capacity(listing.data.children.len());
        for Child { data: post } in listing.data.children {
            let title = normalize_text(&post.title, TEXT_MAX_CHARS);
            if title.is_empty() {
                continue;
            }
            let text = normalize_text(&post.selftext, TEXT_MAX_CHARS);
            if self.pain_only && !is_pain_related(&format!("{title} {text}")) {
                continue;
            }

            let url = if post.permalink.is_empty() {
                String::new()
            } else {
                format!("https://reddit.com{}", post.permalink)
            };
            let mut c = Candidate::new(url.clone(), "reddit")
                .with_metric("score", post.score as f64)
                .with_metric("comments", post.num_comments as f64)
                .with_field("category", problem_category(&title, &text))
                .with_field("title", title)
                .with_field("text", text)
                .with_field("url", url)
                .with_field(
                    "author",
                    post.author.unwrap_or_else(|| "deleted".to_string()),
                )
                .with_field("subreddit", post.subreddit)
                .with_field("query", query);
            if let Some(ts) = unix_to_utc(post.created_utc) {
                c = c.with_created_at(ts);
            }
            out.push(c);
            if out.len() >= limit {
                break;
            }
        }

        histogram!("radar_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

fn unix_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}

#[async_trait]
impl CandidateSource for RedditSource {
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceUnavailable> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_listing(s, query, limit),
            Mode::Http {
                base_url,
                client,
                retry,
            } => {
                let sub = query.trim().trim_start_matches("r/");
                let url = format!("{base_url}/r/{sub}/new.json");
                let body = get_text(
                    client,
                    &url,
                    &[("limit", limit.to_string())],
                    retry,
                    self.name(),
                    query,
                )
                .await?;
                self.parse_listing(&body, query, limit)
            }
        }
    }

    fn name(&self) -> &str {
        "reddit"
    }
}
