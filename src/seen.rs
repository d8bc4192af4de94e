//! Durable record of delivered candidate ids.
//!
//! Delivery is at-least-once across restarts: ids added after the last successful
//! `flush` live only in memory and may be delivered again by the next process. Within
//! a process the in-memory set always reflects every `add`, even if flushing fails.

use indexmap::IndexSet;
use std::sync::Arc;

use crate::errors::PersistenceError;
use crate::store::{FileRowStore, Row, RowStore};

pub const SEEN_HEADER: &[&str] = &["id"];

pub struct SeenSet {
    ids: IndexSet<String>,
    pending: Vec<String>,
    compact_on_flush: bool,
    capacity: Option<usize>,
    store: Arc<dyn RowStore>,
}

impl SeenSet {
    /// Load ids from `store`, keeping only the newest `capacity` when bounded.
    pub async fn load(
        store: Arc<dyn RowStore>,
        capacity: Option<usize>,
    ) -> Result<Self, PersistenceError> {
        let rows = store.read_all().await?;
        let mut ids = IndexSet::with_capacity(rows.len());
        for row in rows {
            if let Some(id) = row.into_iter().next() {
                let id = id.trim().to_string();
                if !id.is_empty() {
                    // Re-inserting keeps the original position; ids are append-only.
                    ids.insert(id);
                }
            }
        }

        let mut set = Self {
            ids,
            pending: Vec::new(),
            compact_on_flush: false,
            capacity: capacity.filter(|c| *c > 0),
            store,
        };
        if set.evict_overflow() > 0 {
            set.compact_on_flush = true;
        }
        tracing::debug!(target: "seen", loaded = set.ids.len(), store = %set.store.describe(), "seen set loaded");
        Ok(set)
    }

    pub async fn open_file(
        path: impl Into<std::path::PathBuf>,
        capacity: Option<usize>,
    ) -> Result<Self, PersistenceError> {
        Self::load(Arc::new(FileRowStore::new(path, SEEN_HEADER)), capacity).await
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Idempotent. Returns `true` when the id was not present before.
    pub fn add(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        self.pending.push(id.to_string());
        if self.evict_overflow() > 0 {
            self.compact_on_flush = true;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Ids in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Persist everything added since the last successful flush.
    pub async fn flush(&mut self) -> Result<(), PersistenceError> {
        if self.compact_on_flush {
            let rows: Vec<Row> = self.ids.iter().map(|id| vec![id.clone()]).collect();
            self.store.replace_all(&rows).await?;
            self.compact_on_flush = false;
            self.pending.clear();
            return Ok(());
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows: Vec<Row> = self.pending.iter().map(|id| vec![id.clone()]).collect();
        self.store.append_rows(&rows).await?;
        self.pending.clear();
        Ok(())
    }

    fn evict_overflow(&mut self) -> usize {
        let Some(cap) = self.capacity else {
            return 0;
        };
        let excess = self.ids.len().saturating_sub(cap);
        if excess > 0 {
            self.ids.drain(0..excess);
            // Evicted ids that were never flushed don't need to be written at all.
            let ids = &self.ids;
            self.pending.retain(|p| ids.contains(p));
        }
        excess
    }
}

impl std::fmt::Debug for SeenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeenSet")
            .field("len", &self.ids.len())
            .field("pending", &self.pending.len())
            .field("capacity", &self.capacity)
            .field("store", &self.store.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRowStore;

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter().map(|i| vec![i.to_string()]).collect()
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let mut seen = SeenSet::load(Arc::new(MemoryRowStore::new()), None)
            .await
            .unwrap();
        assert!(seen.add("v1"));
        assert!(!seen.add("v1"));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.pending(), 1);
        assert!(seen.contains("v1"));
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_first() {
        let store = Arc::new(MemoryRowStore::new());
        let mut seen = SeenSet::load(store.clone(), Some(2)).await.unwrap();
        seen.add("a");
        seen.add("b");
        seen.add("c");
        assert!(!seen.contains("a"));
        assert_eq!(seen.iter().collect::<Vec<_>>(), vec!["b", "c"]);

        seen.flush().await.unwrap();
        assert_eq!(store.snapshot(), rows(&["b", "c"]));
    }

    #[tokio::test]
    async fn load_keeps_newest_when_bounded() {
        let store = Arc::new(MemoryRowStore::with_rows(rows(&["a", "b", "c", "d"])));
        let seen = SeenSet::load(store, Some(3)).await.unwrap();
        assert_eq!(seen.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn failed_flush_keeps_memory_and_retries_later() {
        let store = Arc::new(MemoryRowStore::new());
        let mut seen = SeenSet::load(store.clone(), None).await.unwrap();
        seen.add("v4");

        store.set_fail_writes(true);
        assert!(seen.flush().await.is_err());
        assert!(seen.contains("v4"));
        assert_eq!(seen.pending(), 1);

        store.set_fail_writes(false);
        seen.flush().await.unwrap();
        assert_eq!(seen.pending(), 0);
        assert_eq!(store.snapshot(), rows(&["v4"]));
    }

    #[tokio::test]
    async fn file_backed_set_survives_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sent_videos.tsv");
        {
            let mut seen = SeenSet::open_file(&path, None).await.unwrap();
            seen.add("https://www.tiktok.com/@a/video/1");
            seen.flush().await.unwrap();
        }
        let seen = SeenSet::open_file(&path, None).await.unwrap();
        assert!(seen.contains("https://www.tiktok.com/@a/video/1"));
        assert_eq!(seen.len(), 1);
    }
}
