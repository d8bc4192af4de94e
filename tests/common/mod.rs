// tests/common/mod.rs
//
// Shared mocks for the integration tests: scripted sources and a recording deliverer.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;

use viral_radar::analyze::{Scorer, ScoringConfig};
use viral_radar::seen::SeenSet;
use viral_radar::store::{MemoryRowStore, RowStore};
use viral_radar::{
    Candidate, CandidateSource, Deliverer, DeliveryError, FailureKind, Message, SourceUnavailable,
};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
}

pub fn video(id: &str, views: f64, age_hours: i64) -> Candidate {
    Candidate::new(id, "tiktok")
        .with_created_at(fixed_now() - ChronoDuration::hours(age_hours))
        .with_metric("views", views)
        .with_field("title", format!("video {id}"))
}

/// Returns the same batch for every query; records the queries it saw.
pub struct ScriptedSource {
    name: String,
    items: Vec<Candidate>,
    pub queries: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(name: &str, items: Vec<Candidate>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CandidateSource for ScriptedSource {
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, SourceUnavailable> {
        self.queries.lock().push(query.to_string());
        Ok(self.items.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct DownSource;

#[async_trait]
impl CandidateSource for DownSource {
    async fn fetch(&self, query: &str, _limit: usize) -> Result<Vec<Candidate>, SourceUnavailable> {
        Err(SourceUnavailable::new("down", query, "connection refused"))
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Records delivered urls; fails permanently for the ids in `fail`.
#[derive(Default)]
pub struct RecordingDeliverer {
    pub sent: Mutex<Vec<String>>,
    fail: HashSet<String>,
}

impl RecordingDeliverer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: ids.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    fn channel(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        if self.fail.contains(&message.url) {
            return Err(DeliveryError {
                channel: "recording".into(),
                kind: FailureKind::Permanent,
                attempts: 1,
                reason: "403 Forbidden".into(),
            });
        }
        self.sent.lock().push(message.url.clone());
        Ok(())
    }
}

pub fn scorer() -> Scorer {
    Scorer::new(ScoringConfig::default())
}

pub async fn seen_with(ids: &[&str]) -> (SeenSet, Arc<MemoryRowStore>) {
    let store = Arc::new(MemoryRowStore::with_rows(
        ids.iter().map(|id| vec![id.to_string()]).collect(),
    ));
    let seen = SeenSet::load(store.clone() as Arc<dyn RowStore>, None)
        .await
        .expect("load seen");
    (seen, store)
}
