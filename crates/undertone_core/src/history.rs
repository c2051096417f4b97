//! History collaborator.
//!
//! Append-only from the orchestrator's side: completed results are pushed,
//! the oldest are evicted once the cap is reached. Reads are for front ends
//! (`undertonectl history`), never for the analysis path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use undertone_common::config::HistoryConfig;
use undertone_common::{AnalysisMode, AnalysisResult};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub request_id: Uuid,
    pub mode: AnalysisMode,
    pub recorded_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

impl HistoryEntry {
    pub fn new(request_id: Uuid, mode: AnalysisMode, result: AnalysisResult) -> Self {
        Self {
            request_id,
            mode,
            recorded_at: Utc::now(),
            result,
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError>;

    /// Most recent first, at most `limit` entries
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError>;

    fn capacity(&self) -> usize;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug)]
pub struct MemoryHistory {
    max_entries: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            entries: Mutex::new(VecDeque::with_capacity(max_entries)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().await;
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    fn capacity(&self) -> usize {
        self.max_entries
    }
}

// ============================================================================
// JSONL file
// ============================================================================

/// One JSON record per line. Appends are plain appends; the file is
/// rewritten only when it grows past twice the cap.
///
/// The line count is read from disk once, on the first append, and tracked
/// in memory after that. Bytes that are not UTF-8 or not JSON are skipped on
/// read and dropped at the next compaction.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    max_entries: usize,
    // Lines on disk; `None` until the first append. Also serializes writers.
    lines: Mutex<Option<usize>>,
}

fn count_lines(bytes: &[u8]) -> usize {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .count()
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
            lines: Mutex::new(None),
        }
    }

    /// `None` when history is disabled or no data dir can be resolved
    pub fn from_config(config: &HistoryConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        config
            .effective_path()
            .map(|path| Self::new(path, config.effective_max_entries()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_bytes(&self) -> Result<Vec<u8>, HistoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let bytes = self.read_bytes().await?;
        let text = String::from_utf8_lossy(&bytes);

        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %self.path.display(), "Skipping malformed history line: {}", e),
            }
        }
        Ok(entries)
    }

    /// Rewrite the file with the newest `max_entries` records; returns the
    /// number kept
    async fn compact(&self) -> Result<usize, HistoryError> {
        let mut entries = self.read_all().await?;
        let excess = entries.len().saturating_sub(self.max_entries);
        entries.drain(..excess);

        let mut text = String::new();
        for entry in &entries {
            text.push_str(&serde_json::to_string(entry)?);
            text.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(kept = entries.len(), "Compacted history file");
        Ok(entries.len())
    }
}

#[async_trait]
impl HistoryStore for JsonlHistory {
    async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut lines = self.lines.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let on_disk = match *lines {
            Some(count) => count,
            None => count_lines(&self.read_bytes().await?),
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        drop(file);

        let mut count = on_disk + 1;
        *lines = Some(count);
        if count > self.max_entries * 2 {
            count = self.compact().await?;
            *lines = Some(count);
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let entries = self.read_all().await?;
        let start = entries.len().saturating_sub(self.max_entries);
        Ok(entries[start..].iter().rev().take(limit).cloned().collect())
    }

    fn capacity(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::canned_result;
    use undertone_common::BackendId;

    fn entry(risk: u8) -> HistoryEntry {
        HistoryEntry::new(
            Uuid::new_v4(),
            AnalysisMode::Quick,
            canned_result(BackendId::LocalHeuristic, risk, 0, 0.5),
        )
    }

    #[tokio::test]
    async fn test_memory_history_evicts_oldest() {
        let history = MemoryHistory::new(3);
        for risk in 0..5 {
            history.append(entry(risk)).await.unwrap();
        }
        assert_eq!(history.len().await, 3);

        let recent = history.recent(10).await.unwrap();
        let risks: Vec<u8> = recent.iter().map(|e| e.result.overall_risk).collect();
        assert_eq!(risks, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_memory_history_limit() {
        let history = MemoryHistory::new(50);
        for risk in 0..10 {
            history.append(entry(risk)).await.unwrap();
        }
        assert_eq!(history.recent(2).await.unwrap().len(), 2);
        assert_eq!(history.capacity(), 50);
    }

    #[tokio::test]
    async fn test_jsonl_history_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(dir.path().join("history.jsonl"), 5);
        assert!(history.recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_history_caps_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let history = JsonlHistory::new(&path, 3);
        for risk in 0..10 {
            history.append(entry(risk)).await.unwrap();
        }

        let recent = history.recent(10).await.unwrap();
        let risks: Vec<u8> = recent.iter().map(|e| e.result.overall_risk).collect();
        assert_eq!(risks, vec![9, 8, 7]);

        // Compaction keeps the file bounded
        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert!(lines <= 6, "file holds {} lines", lines);
    }

    #[tokio::test]
    async fn test_jsonl_history_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = JsonlHistory::new(&path, 5);
        history.append(entry(12)).await.unwrap();
        std::fs::write(
            &path,
            format!("{}not json\n", std::fs::read_to_string(&path).unwrap()),
        )
        .unwrap();
        history.append(entry(13)).await.unwrap();

        let recent = history.recent(5).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].result.overall_risk, 13);
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        let config = HistoryConfig {
            enabled: false,
            ..HistoryConfig::default()
        };
        assert!(JsonlHistory::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_jsonl_history_survives_non_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(&path, [0xff, 0xfe, b'{', b'\n', 0xc3, b'x', b'\n']).unwrap();

        let history = JsonlHistory::new(&path, 2);
        for risk in 0..10 {
            history.append(entry(risk)).await.unwrap();
            let lines = std::fs::read(&path)
                .unwrap()
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            assert!(lines <= 4, "file holds {} lines after append {}", lines, risk);
        }

        let recent = history.recent(10).await.unwrap();
        let risks: Vec<u8> = recent.iter().map(|e| e.result.overall_risk).collect();
        assert_eq!(risks, vec![9, 8]);
    }

    #[test]
    fn test_count_lines_ignores_blank_lines() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a\n\n  \nb"), 2);
        assert_eq!(count_lines(&[0xff, b'\n', 0xfe, b'\n']), 2);
    }
}
