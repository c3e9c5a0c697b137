#![forbid(unsafe_code)]

//! Per-attempt activity hooks.
//!
//! The query core emits exactly one [`ActivityRecord`] for every call to
//! [`crate::service::QueryService::run_query`], whatever the outcome. Sinks
//! decide what to do with it; persistence is left to the embedding
//! application.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Opaque caller session identifier. Only ever copied onto activity records.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a caller-supplied token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens may be bearer credentials.
        write!(f, "SessionToken(..{})", self.0.len())
    }
}

/// Validator verdict as recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerdictSummary {
    /// Passed validation and planning.
    Accepted,
    /// Refused; carries the rejection code.
    Rejected(&'static str),
}

/// How the attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Rows were returned.
    Success,
    /// Refused before execution.
    Rejected,
    /// Execution failed; carries the error code.
    Failed(&'static str),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match *self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Failed(code) => code,
        }
    }
}

/// Immutable record of one query attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityRecord {
    /// Caller session, when one was supplied.
    pub session: Option<SessionToken>,
    /// Query text exactly as submitted.
    pub query_text: String,
    /// Validator verdict.
    pub verdict: VerdictSummary,
    /// Final outcome.
    pub outcome: Outcome,
    /// Time from receipt to response.
    pub duration: Duration,
    /// Rows returned, zero on failure.
    pub row_count: usize,
}

/// Receives activity records.
pub trait ActivitySink: Send + Sync {
    /// Records one attempt. Must not block for long; it runs on the request
    /// path.
    fn record(&self, record: &ActivityRecord);
}

/// Discards every record.
#[derive(Default)]
pub struct NoopActivity;

impl ActivitySink for NoopActivity {
    fn record(&self, _record: &ActivityRecord) {}
}

/// Emits one `tracing` event per attempt.
#[derive(Default)]
pub struct TracingActivity;

impl ActivitySink for TracingActivity {
    fn record(&self, record: &ActivityRecord) {
        let session = record.session.as_ref().map(SessionToken::as_str).unwrap_or("-");
        let duration_ms = record.duration.as_secs_f64() * 1000.0;
        match record.verdict {
            VerdictSummary::Rejected(code) => debug!(
                session,
                code,
                query_len = record.query_text.len(),
                "query.rejected"
            ),
            VerdictSummary::Accepted => info!(
                session,
                outcome = record.outcome.label(),
                rows = record.row_count,
                duration_ms,
                "query.executed"
            ),
        }
    }
}

/// Thread-safe attempt counters.
#[derive(Default)]
pub struct CounterActivity {
    /// Attempts seen.
    pub attempts: AtomicU64,
    /// Attempts refused by validation or planning.
    pub rejected: AtomicU64,
    /// Attempts that returned rows.
    pub succeeded: AtomicU64,
    /// Attempts that failed during execution.
    pub failed: AtomicU64,
    /// Failures caused by the deadline.
    pub timeouts: AtomicU64,
    /// Rows returned across all successful attempts.
    pub rows_returned: AtomicU64,
}

/// Point-in-time copy of [`CounterActivity`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    /// Attempts seen.
    pub attempts: u64,
    /// Attempts refused.
    pub rejected: u64,
    /// Attempts that returned rows.
    pub succeeded: u64,
    /// Attempts that failed during execution.
    pub failed: u64,
    /// Deadline failures.
    pub timeouts: u64,
    /// Rows returned.
    pub rows_returned: u64,
}

impl CounterActivity {
    /// Reads all counters.
    pub fn snapshot(&self) -> ActivityStats {
        ActivityStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
        }
    }
}

impl ActivitySink for CounterActivity {
    fn record(&self, record: &ActivityRecord) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match record.outcome {
            Outcome::Success => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.rows_returned
                    .fetch_add(record.row_count as u64, Ordering::Relaxed);
            }
            Outcome::Rejected => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failed(code) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if code == "Timeout" {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Keeps every record in memory. Intended for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryActivity {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivity {
    /// Copies out everything recorded so far.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().clone()
    }
}

impl ActivitySink for MemoryActivity {
    fn record(&self, record: &ActivityRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Forwards each record to several sinks in order.
#[derive(Default, Clone)]
pub struct ActivityFanout {
    sinks: Vec<Arc<dyn ActivitySink>>,
}

impl ActivityFanout {
    /// Adds a sink.
    pub fn with(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ActivitySink for ActivityFanout {
    fn record(&self, record: &ActivityRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

/// Returns the sink used when none is configured.
pub fn default_activity() -> Arc<dyn ActivitySink> {
    Arc::new(TracingActivity)
}
