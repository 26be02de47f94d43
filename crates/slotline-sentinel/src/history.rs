//! Daily-rotated health history
//!
//! Every report appends one JSON object per line to
//! `health_history_YYYYMMDD.json` (UTC date). On start-up the last record of
//! today's file restores the error counters of the previous run.

use crate::error::{Result, SentinelError};
use crate::metrics::CycleSummary;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use slotline_core_resilience::AggregateHealth;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// One line of the history file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub health_status: AggregateHealth,
    pub error_counts: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_cycle: Option<CycleSummary>,
}

/// Append-only writer and reader for the history directory
#[derive(Debug)]
pub struct HealthHistory {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl HealthHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("health_history_{}.json", date.format("%Y%m%d")))
    }

    /// Append `record` to the file of the record's own date
    pub async fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SentinelError::io(&self.dir, e))?;

        let path = self.file_for(record.timestamp.date_naive());
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SentinelError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SentinelError::io(&path, e))?;
        file.flush().await.map_err(|e| SentinelError::io(&path, e))?;
        Ok(())
    }

    /// Last readable record written on `date`
    ///
    /// Lines that fail to parse, such as a tail torn by a crash mid-write, are
    /// skipped.
    pub async fn load_latest(&self, date: NaiveDate) -> Result<Option<HistoryRecord>> {
        let path = self.file_for(date);
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SentinelError::io(&path, e)),
        };

        for (index, line) in contents.lines().enumerate().collect::<Vec<_>>().into_iter().rev() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => warn!(
                    line = index + 1,
                    "Skipping unreadable record in {}: {}",
                    path.display(),
                    e
                ),
            }
        }
        Ok(None)
    }
}
