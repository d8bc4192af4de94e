//! Row-oriented persistence: the seen-id file and the human-readable delivered log.
//!
//! Rows are tab-separated lines under a header line. Missing files (and their parent
//! directories) are created on first read, so a fresh checkout needs no setup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::candidate::ScoredCandidate;
use crate::errors::PersistenceError;

pub type Row = Vec<String>;

#[async_trait]
pub trait RowStore: Send + Sync {
    /// All data rows (header excluded), oldest first.
    async fn read_all(&self) -> Result<Vec<Row>, PersistenceError>;
    async fn append_rows(&self, rows: &[Row]) -> Result<(), PersistenceError>;
    /// Replace every data row; used for compaction.
    async fn replace_all(&self, rows: &[Row]) -> Result<(), PersistenceError>;
    fn describe(&self) -> String;
}

/// Tab-separated file with a fixed header line.
#[derive(Debug, Clone)]
pub struct FileRowStore {
    path: PathBuf,
    header: Row,
}

impl FileRowStore {
    pub fn new(path: impl Into<PathBuf>, header: &[&str]) -> Self {
        Self {
            path: path.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, e: impl ToString) -> PersistenceError {
        PersistenceError::new(self.describe(), e)
    }

    async fn ensure_parent(&self) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(|e| self.err(e))?;
        }
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<(), PersistenceError> {
        if fs::try_exists(&self.path).await.map_err(|e| self.err(e))? {
            return Ok(());
        }
        self.ensure_parent().await?;
        fs::write(&self.path, encode_line(&self.header))
            .await
            .map_err(|e| self.err(e))
    }
}

#[async_trait]
impl RowStore for FileRowStore {
    async fn read_all(&self) -> Result<Vec<Row>, PersistenceError> {
        self.ensure_initialized().await?;
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.err(e))?;

        let mut rows = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: Row = line.split('\t').map(str::to_string).collect();
            if i == 0 && row == self.header {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn append_rows(&self, rows: &[Row]) -> Result<(), PersistenceError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_initialized().await?;

        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.err(e))?;
        let mut buf = String::new();
        for r in rows {
            buf.push_str(&encode_line(r));
        }
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| self.err(e))?;
        file.sync_data().await.map_err(|e| self.err(e))
    }

    async fn replace_all(&self, rows: &[Row]) -> Result<(), PersistenceError> {
        self.ensure_parent().await?;
        let mut buf = encode_line(&self.header);
        for r in rows {
            buf.push_str(&encode_line(r));
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, buf).await.map_err(|e| self.err(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.err(e))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn encode_line(row: &[String]) -> String {
    let cells: Vec<String> = row
        .iter()
        .map(|c| c.replace(['\t', '\r', '\n'], " "))
        .collect();
    let mut line = cells.join("\t");
    line.push('\n');
    line
}

/// In-process store; `fail_writes` lets tests simulate a broken disk.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    rows: std::sync::Mutex<Vec<Row>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: std::sync::Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Row> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PersistenceError::new("memory", "writes disabled"));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Row>>, PersistenceError> {
        self.rows
            .lock()
            .map_err(|_| PersistenceError::new("memory", "mutex poisoned"))
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn read_all(&self) -> Result<Vec<Row>, PersistenceError> {
        Ok(self.lock()?.clone())
    }

    async fn append_rows(&self, rows: &[Row]) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.lock()?.extend_from_slice(rows);
        Ok(())
    }

    async fn replace_all(&self, rows: &[Row]) -> Result<(), PersistenceError> {
        self.check_writable()?;
        *self.lock()? = rows.to_vec();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Columns of the delivered-items sheet.
pub const DELIVERED_LOG_HEADER: &[&str] = &[
    "delivered_at",
    "id",
    "source",
    "score",
    "title",
    "views",
    "query",
    "url",
];

/// Summary of the delivered log, newest row last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub location: String,
    pub rows: usize,
    pub by_source: BTreeMap<String, usize>,
    pub first_delivered_at: Option<DateTime<Utc>>,
    pub last_delivered_at: Option<DateTime<Utc>>,
    pub last_id: Option<String>,
    pub last_title: Option<String>,
}

/// Human-readable record of every delivery (one row each).
#[derive(Clone)]
pub struct DeliveryLog {
    store: Arc<dyn RowStore>,
    retain: Option<chrono::Duration>,
}

impl DeliveryLog {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store, retain: None }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileRowStore::new(path, DELIVERED_LOG_HEADER)))
    }

    /// Rows older than `retain` are dropped by [`DeliveryLog::prune`].
    pub fn with_retention(mut self, retain: chrono::Duration) -> Self {
        self.retain = Some(retain);
        self
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retain
    }

    pub fn row_for(item: &ScoredCandidate, at: DateTime<Utc>) -> Row {
        let c = &item.candidate;
        vec![
            at.to_rfc3339(),
            c.id.clone(),
            c.source.clone(),
            format!("{:.3}", item.score),
            c.title().to_string(),
            format!("{}", c.metric("views").max(0.0) as u64),
            c.field("query").unwrap_or_default().to_string(),
            c.field("url").unwrap_or(&c.id).to_string(),
        ]
    }

    pub async fn append(&self, rows: &[Row]) -> Result<(), PersistenceError> {
        self.store.append_rows(rows).await
    }

    /// Rewrite the log without rows delivered before `now - retain`.
    /// Rows whose timestamp cannot be read are kept. Returns the number removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let Some(retain) = self.retain else {
            return Ok(0);
        };
        let cutoff = now - retain;
        let rows = self.store.read_all().await?;
        let before = rows.len();
        let kept: Vec<Row> = rows
            .into_iter()
            .filter(|r| delivered_at(r).map_or(true, |at| at >= cutoff))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.store.replace_all(&kept).await?;
            tracing::info!(target: "store", removed, kept = kept.len(), log = %self.describe(), "delivered log pruned");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<DeliveryStats, PersistenceError> {
        let rows = self.store.read_all().await?;
        let mut stats = DeliveryStats {
            location: self.describe(),
            rows: rows.len(),
            ..DeliveryStats::default()
        };
        for r in &rows {
            let source = r.get(2).filter(|s| !s.is_empty()).map_or("unknown", String::as_str);
            *stats.by_source.entry(source.to_string()).or_default() += 1;
        }
        stats.first_delivered_at = rows.iter().find_map(|r| delivered_at(r));
        if let Some(last) = rows.last() {
            stats.last_delivered_at = delivered_at(last);
            stats.last_id = last.get(1).cloned();
            stats.last_title = last.get(4).cloned();
        }
        Ok(stats)
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }
}

fn delivered_at(row: &Row) -> Option<DateTime<Utc>> {
    let raw = row.first()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
