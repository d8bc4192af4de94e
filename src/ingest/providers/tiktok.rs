// src/ingest/providers/tiktok.rs
//! Content feed: TikTok keyword search through a JSON search endpoint.
//!
//! Endpoints in the wild disagree on shape, so the parser accepts a bare array or an
//! object wrapping the list in `items`, `item_list` or `data`; ids, timestamps and counts
//! may be numbers or strings ("1.2M views"). Each item is read on its own: an unreadable
//! one becomes an id-less candidate and is counted as malformed, the rest still count.

use async_trait::async_trait;
use chrono::DateTime;
use metrics::histogram;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use super::{build_client, get_text, HttpSettings};
use crate::candidate::Candidate;
use crate::errors::{ConfigurationError, SourceUnavailable};
use crate::ingest::normalize_text;
use crate::ingest::types::CandidateSource;
use crate::retry::RetryPolicy;

const TITLE_MAX_CHARS: usize = 300;

/// Items stay raw so one unreadable entry doesn't take the whole page down.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<serde_json::Value>),
    Wrapped {
        #[serde(alias = "item_list", alias = "data", default)]
        items: Vec<serde_json::Value>,
    },
}

/// Video ids arrive as strings or as bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VideoId {
    Text(String),
    Num(serde_json::Number),
}

impl VideoId {
    fn as_string(&self) -> String {
        match self {
            VideoId::Text(s) => s.trim().to_string(),
            VideoId::Num(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Secs(i64),
    Text(String),
}

impl Timestamp {
    fn secs(&self) -> Option<i64> {
        match self {
            Timestamp::Secs(t) => Some(*t),
            Timestamp::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Num(f64),
    Text(String),
}

impl Count {
    fn value(&self) -> f64 {
        match self {
            Count::Num(n) => *n,
            Count::Text(s) => parse_view_count(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Author {
    Name(String),
    Object {
        #[serde(alias = "uniqueId", alias = "unique_id", default)]
        username: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Stats {
    #[serde(alias = "playCount", alias = "views")]
    play_count: Option<Count>,
    #[serde(alias = "diggCount", alias = "likes")]
    digg_count: Option<Count>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: Option<VideoId>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "title")]
    desc: String,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    stats: Stats,
    #[serde(default, alias = "playCount", alias = "views")]
    play_count: Option<Count>,
    #[serde(default, alias = "diggCount", alias = "likes")]
    digg_count: Option<Count>,
    #[serde(default, alias = "createTime", alias = "create_time")]
    created: Option<Timestamp>,
}

impl Item {
    fn author_name(&self) -> String {
        match &self.author {
            Some(Author::Name(s)) => s.clone(),
            Some(Author::Object { username }) => username.clone(),
            None => String::new(),
        }
    }

    fn views(&self) -> f64 {
        self.stats
            .play_count
            .as_ref()
            .or(self.play_count.as_ref())
            .map(Count::value)
            .unwrap_or(0.0)
    }

    fn likes(&self) -> f64 {
        self.stats
            .digg_count
            .as_ref()
            .or(self.digg_count.as_ref())
            .map(Count::value)
            .unwrap_or(0.0)
    }
}

/// Leading number plus optional K/M/B suffix; trailing words are ignored.
static RE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([KMB]?)\b").unwrap());

/// "1.2M views" -> 1_200_000, "850K" -> 850_000, "2,300" -> 2_300. Unparseable input is 0.
pub fn parse_view_count(raw: &str) -> f64 {
    let s = raw.replace([',', '_'], "");
    let Some(caps) = RE_COUNT.captures(&s) else {
        return 0.0;
    };
    let mult = match caps[2].to_ascii_uppercase().as_str() {
        "K" => 1_000.0,
        "M" => 1_000_000.0,
        "B" => 1_000_000_000.0,
        _ => 1.0,
    };
    caps[1]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| (v * mult).round())
        .unwrap_or(0.0)
}

pub struct TikTokSource {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        endpoint: String,
        client: Client,
        retry: RetryPolicy,
    },
}

impl TikTokSource {
    /// Serves the same document for every query.
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn http(endpoint: &str, settings: &HttpSettings) -> Result<Self, ConfigurationError> {
        if endpoint.trim().is_empty() {
            return Err(ConfigurationError::new("tiktok feed needs an endpoint"));
        }
        Ok(Self {
            mode: Mode::Http {
                endpoint: endpoint.trim().to_string(),
                client: build_client(settings)?,
                retry: settings.retry,
            },
        })
    }

    fn parse(&self, body: &str, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceUnavailable> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(body)
            .map_err(|e| SourceUnavailable::new(self.name(), query, format!("parsing search results: {e}")))?;
        let items = match resp {
            SearchResponse::List(v) => v,
            SearchResponse::Wrapped { items } => items,
        };

        let out = items
            .into_iter()
            .take(limit)
            .map(|raw| match serde_json::from_value::<Item>(raw) {
                Ok(item) => to_candidate(item, query),
                Err(e) => {
                    tracing::debug!(target: "ingest", feed = "tiktok", query, error = %e, "unreadable search item");
                    // Empty id: counted as malformed downstream.
                    Candidate::new("", "tiktok").with_field("query", query)
                }
            })
            .collect();
        histogram!("radar_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

fn to_candidate(item: Item, query: &str) -> Candidate {
    let author = item.author_name();
    let id = item.id.as_ref().map(VideoId::as_string).unwrap_or_default();
    let url = match &item.url {
        Some(u) if !u.trim().is_empty() => u.trim().to_string(),
        _ if !id.is_empty() => format!("https://www.tiktok.com/@{author}/video/{id}"),
        // Counted as malformed downstream.
        _ => String::new(),
    };
    let title = normalize_text(&item.desc, TITLE_MAX_CHARS);
    let title = if title.is_empty() {
        "No title".to_string()
    } else {
        title
    };

    let mut c = Candidate::new(url.clone(), "tiktok")
        .with_metric("views", item.views())
        .with_metric("likes", item.likes())
        .with_field("title", title)
        .with_field("author", author)
        .with_field("url", url)
        .with_field("query", query);
    if let Some(ts) = item
        .created
        .as_ref()
        .and_then(Timestamp::secs)
        .filter(|t| *t > 0)
        .and_then(|t| DateTime::from_timestamp(t, 0))
    {
        c = c.with_created_at(ts);
    }
    c
}

#[async_trait]
impl CandidateSource for TikTokSource {
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceUnavailable> {
        match &self.mode {
            Mode::Fixture(s) => self.parse(s, query, limit),
            Mode::Http {
                endpoint,
                client,
                retry,
            } => {
                let body = get_text(
                    client,
                    endpoint,
                    &[("keyword", query.to_string()), ("count", limit.to_string())],
                    retry,
                    self.name(),
                    query,
                )
                .await?;
                self.parse(&body, query, limit)
            }
        }
    }

    fn name(&self) -> &str {
        "tiktok"
    }
}
