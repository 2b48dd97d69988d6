//! Order journal for idempotent submission.
//!
//! Every order attempt is recorded under its client order id before the
//! exchange is called. Recording the same id twice is refused, so a retried
//! cycle can never submit the same order a second time.
//!
//! # Flow
//!
//! 1. Record attempt (before `place_order`)
//! 2. Place and track the order
//! 3. Complete attempt with the final status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use btcbot_domain::ClientOrderId;

use crate::error::{ExecError, ExecResult};

/// How many attempts the journal remembers.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

// =============================================================================
// Attempt
// =============================================================================

/// One recorded order attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAttempt {
    /// Idempotency key
    pub client_order_id: ClientOrderId,
    /// When the attempt was recorded
    pub recorded_at: DateTime<Utc>,
    /// Final order status once tracking finished
    pub final_status: Option<String>,
    /// When tracking finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl OrderAttempt {
    /// Whether tracking has finished.
    pub fn is_complete(&self) -> bool {
        self.final_status.is_some()
    }
}

// =============================================================================
// Journal
// =============================================================================

#[derive(Default)]
struct Entries {
    by_id: HashMap<ClientOrderId, OrderAttempt>,
    order: VecDeque<ClientOrderId>,
}

/// In-memory journal of recent order attempts.
pub struct OrderJournal {
    capacity: usize,
    entries: RwLock<Entries>,
}

impl OrderJournal {
    /// Create a journal with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    /// Create a journal remembering at most `capacity` attempts.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Record an attempt before submission.
    ///
    /// Returns `ExecError::AlreadySubmitted` if the id was seen before.
    pub fn record(&self, client_order_id: &ClientOrderId) -> ExecResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ExecError::Journal(format!("Failed to acquire write lock: {}", e)))?;

        if entries.by_id.contains_key(client_order_id) {
            return Err(ExecError::AlreadySubmitted(client_order_id.to_string()));
        }

        while entries.order.len() >= self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.by_id.remove(&oldest);
            }
        }

        entries.order.push_back(client_order_id.clone());
        entries.by_id.insert(
            client_order_id.clone(),
            OrderAttempt {
                client_order_id: client_order_id.clone(),
                recorded_at: Utc::now(),
                final_status: None,
                completed_at: None,
            },
        );
        Ok(())
    }

    /// Complete an attempt with the final order status.
    pub fn complete(&self, client_order_id: &ClientOrderId, final_status: &str) -> ExecResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ExecError::Journal(format!("Failed to acquire write lock: {}", e)))?;

        let attempt = entries
            .by_id
            .get_mut(client_order_id)
            .ok_or_else(|| ExecError::UnknownAttempt(client_order_id.to_string()))?;

        attempt.final_status = Some(final_status.to_string());
        attempt.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Look up an attempt.
    pub fn get(&self, client_order_id: &ClientOrderId) -> ExecResult<Option<OrderAttempt>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ExecError::Journal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(entries.by_id.get(client_order_id).cloned())
    }

    /// Number of remembered attempts.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.order.len()).unwrap_or(0)
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OrderJournal {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
