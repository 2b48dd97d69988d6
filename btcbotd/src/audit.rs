//! Audit event sink.
//!
//! Every order attempt, order result, fetch/cancel result, risk stop and
//! startup validation is appended as one JSON line. Secret-looking payload
//! keys are redacted here, so callers can pass payloads through unfiltered.
//!
//! # File layout
//!
//! ```text
//! {logs_dir}/audit_events.jsonl      current file
//! {logs_dir}/audit_events.jsonl.1    previous file
//! ...
//! {logs_dir}/audit_events.jsonl.N    oldest kept (N = retention)
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::DaemonResult;

/// Audit file name inside the logs directory.
pub const AUDIT_FILE_NAME: &str = "audit_events.jsonl";

/// Replacement for redacted values.
pub const REDACTED: &str = "***";

/// Key fragments that mark a payload value as secret.
const SECRET_KEY_MARKERS: &[&str] = &["api_key", "api_secret", "secret", "token", "password", "webhook_url"];

// =============================================================================
// Policy & record
// =============================================================================

/// Rotation policy, passed to the sink at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditLogPolicy {
    /// Rotate once the current file would grow past this size
    pub max_bytes: u64,
    /// Rotated files to keep; 0 discards the old file on rotation
    pub retention: usize,
}

impl Default for AuditLogPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            retention: 5,
        }
    }
}

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
}

impl AuditRecord {
    /// Build a record with the payload already redacted.
    pub fn new(event_type: &str, payload: &Value) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            payload: redact(payload),
        }
    }
}

/// Copy of `value` with every secret-looking key replaced by `***`.
///
/// Keys are matched case-insensitively at any depth, including inside arrays.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let redacted: Map<String, Value> = fields
                .iter()
                .map(|(key, inner)| {
                    let inner = if is_secret_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(inner)
                    };
                    (key.clone(), inner)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| lower.contains(marker))
}

// =============================================================================
// Sink trait
// =============================================================================

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event. Implementations redact the payload.
    async fn append_audit_event(&self, event_type: &str, payload: Value) -> DaemonResult<()>;
}

// =============================================================================
// JSONL file sink
// =============================================================================

/// Appends to `audit_events.jsonl` with size-based rotation.
pub struct JsonlAuditSink {
    path: PathBuf,
    policy: AuditLogPolicy,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    /// Sink writing under `logs_dir`.
    pub fn new(logs_dir: impl AsRef<Path>, policy: AuditLogPolicy) -> Self {
        Self {
            path: logs_dir.as_ref().join(AUDIT_FILE_NAME),
            policy,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    async fn rotate(&self) -> DaemonResult<()> {
        if self.policy.retention == 0 {
            tokio::fs::remove_file(&self.path).await?;
            return Ok(());
        }

        let oldest = self.rotated_path(self.policy.retention);
        if tokio::fs::try_exists(&oldest).await? {
            tokio::fs::remove_file(&oldest).await?;
        }
        for index in (1..self.policy.retention).rev() {
            let from = self.rotated_path(index);
            if tokio::fs::try_exists(&from).await? {
                tokio::fs::rename(&from, self.rotated_path(index + 1)).await?;
            }
        }
        tokio::fs::rename(&self.path, self.rotated_path(1)).await?;
        debug!(path = %self.path.display(), "Rotated audit log");
        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append_audit_event(&self, event_type: &str, payload: Value) -> DaemonResult<()> {
        let record = AuditRecord::new(event_type, &payload);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let current = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if current > 0 && current + line.len() as u64 > self.policy.max_bytes {
            self.rotate().await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// =============================================================================
// In-memory sink
// =============================================================================

/// Keeps audit records in memory (tests, dry runs).
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Event types in append order.
    pub fn event_types(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.event_type).collect()
    }

    /// First record of a type.
    pub fn find(&self, event_type: &str) -> Option<AuditRecord> {
        self.records().into_iter().find(|r| r.event_type == event_type)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append_audit_event(&self, event_type: &str, payload: Value) -> DaemonResult<()> {
        let record = AuditRecord::new(event_type, &payload);
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redaction_is_recursive_and_case_insensitive() {
        let payload = json!({
            "API_KEY": "k",
            "nested": {"apiSecretValue": "s", "Webhook_URL": "https://hook", "qty": "0.01"},
            "list": [{"auth_token": "t"}, {"side": "BUY"}],
            "password": {"deep": "p"},
        });

        let redacted = redact(&payload);

        assert_eq!(redacted["API_KEY"], "***");
        assert_eq!(redacted["nested"]["Webhook_URL"], "***");
        assert_eq!(redacted["nested"]["qty"], "0.01");
        assert_eq!(redacted["list"][0]["auth_token"], "***");
        assert_eq!(redacted["list"][1]["side"], "BUY");
        assert_eq!(redacted["password"], "***");
        // camelCase still hits the bare `secret` marker
        assert_eq!(redacted["nested"]["apiSecretValue"], "***");
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path(), AuditLogPolicy::default());

        sink.append_audit_event("order_attempt", json!({"client_order_id": "c1", "api_secret": "s"}))
            .await
            .unwrap();
        sink.append_audit_event("order_result", json!({"status": "accepted"})).await.unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let records: Vec<AuditRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "order_attempt");
        assert_eq!(records[0].payload["api_secret"], "***");
        assert_eq!(records[0].payload["client_order_id"], "c1");
        assert_ne!(records[0].event_id, records[1].event_id);
    }

    #[tokio::test]
    async fn test_rotation_keeps_retention_files() {
        let dir = tempfile::tempdir().unwrap();
        let policy = AuditLogPolicy { max_bytes: 200, retention: 2 };
        let sink = JsonlAuditSink::new(dir.path(), policy);

        for n in 0..10 {
            sink.append_audit_event("risk_stop", json!({"n": n})).await.unwrap();
        }

        assert!(sink.path().exists());
        assert!(dir.path().join("audit_events.jsonl.1").exists());
        assert!(dir.path().join("audit_events.jsonl.2").exists());
        assert!(!dir.path().join("audit_events.jsonl.3").exists());

        // The newest event is always in the current file
        let current = std::fs::read_to_string(sink.path()).unwrap();
        assert!(current.contains("\"n\":9"));
    }

    #[tokio::test]
    async fn test_zero_retention_discards_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy = AuditLogPolicy { max_bytes: 1, retention: 0 };
        let sink = JsonlAuditSink::new(dir.path(), policy);

        sink.append_audit_event("a", json!({})).await.unwrap();
        sink.append_audit_event("b", json!({})).await.unwrap();

        let current = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(current.lines().count(), 1);
        assert!(!dir.path().join("audit_events.jsonl.1").exists());
    }

    #[tokio::test]
    async fn test_memory_sink_redacts() {
        let sink = MemoryAuditSink::new();
        sink.append_audit_event("startup_validation", json!({"token": "x"})).await.unwrap();

        let record = sink.find("startup_validation").unwrap();
        assert_eq!(record.payload["token"], "***");
        assert_eq!(sink.event_types(), vec!["startup_validation"]);
    }
}
