//! Run progress telemetry.
//!
//! The latest state of the live loop is kept in `run_progress.json` so an
//! operator (or a supervisor script) can read it without talking to the
//! process. The file is replaced atomically on every update.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use btcbot_domain::MonitorStatus;

use crate::error::DaemonResult;

/// Progress file name inside the artifacts directory.
pub const PROGRESS_FILE_NAME: &str = "run_progress.json";

/// Progress status words that are not guard statuses.
pub mod progress_status {
    pub const RUNNING: &str = "running";
    pub const DEGRADED: &str = "degraded";
    pub const FAILED: &str = "failed";
}

/// One progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub mode: String,
    pub last_error: Option<String>,
    pub monitor_status: MonitorStatus,
    pub reconnect_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
}

impl ProgressRecord {
    /// Live-mode record stamped now.
    pub fn live(
        status: impl Into<String>,
        last_error: Option<String>,
        monitor_status: MonitorStatus,
        reconnect_count: u32,
    ) -> Self {
        Self {
            status: status.into(),
            updated_at: Utc::now(),
            mode: "live".to_string(),
            last_error,
            monitor_status,
            reconnect_count,
            validation: None,
        }
    }

    /// Attach a startup validation report.
    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Destination for progress snapshots.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit_progress(&self, record: ProgressRecord) -> DaemonResult<()>;
}

// =============================================================================
// File sink
// =============================================================================

/// Writes `run_progress.json` via a temp file and rename.
pub struct FileProgressSink {
    path: PathBuf,
}

impl FileProgressSink {
    pub fn new(artifacts_dir: impl AsRef<Path>) -> Self {
        Self {
            path: artifacts_dir.as_ref().join(PROGRESS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record back.
    pub async fn read(&self) -> DaemonResult<ProgressRecord> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ProgressSink for FileProgressSink {
    async fn emit_progress(&self, record: ProgressRecord) -> DaemonResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory sink
// =============================================================================

/// Keeps every progress record (tests).
#[derive(Default)]
pub struct MemoryProgressSink {
    records: Mutex<Vec<ProgressRecord>>,
}

impl MemoryProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ProgressRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<ProgressRecord> {
        self.records().pop()
    }

    /// `(status, last_error)` pairs in emit order.
    pub fn statuses(&self) -> Vec<(String, Option<String>)> {
        self.records()
            .into_iter()
            .map(|r| (r.status, r.last_error))
            .collect()
    }
}

#[async_trait]
impl ProgressSink for MemoryProgressSink {
    async fn emit_progress(&self, record: ProgressRecord) -> DaemonResult<()> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
        Ok(())
    }
}
