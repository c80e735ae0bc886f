//! Aggregate execution metrics: load-mutate-save counters keyed by verdict,
//! persisted best-effort. A persistence failure never reaches the engine's
//! caller.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{ExecutionResult, Verdict};

/// Full persisted metrics state at one point in time. Field names are the
/// storage contract consumed by external dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub total_executions: u64,
    #[serde(default)]
    pub accepted: u64,
    #[serde(default)]
    pub runtime_error: u64,
    #[serde(default)]
    pub time_limit_exceeded: u64,
    #[serde(default)]
    pub execution_failed: u64,
    #[serde(default)]
    pub internal_error: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl MetricsSnapshot {
    /// Count one execution under its verdict.
    pub fn apply(&mut self, verdict: Verdict) {
        self.total_executions += 1;
        match verdict {
            Verdict::Accepted => self.accepted += 1,
            Verdict::RuntimeError => self.runtime_error += 1,
            Verdict::TimeLimitExceeded => self.time_limit_exceeded += 1,
            Verdict::ExecutionFailed => self.execution_failed += 1,
            Verdict::InternalError => self.internal_error += 1,
        }
    }

    /// Sum of the per-verdict counters; equals `total_executions` after any
    /// successful persist.
    pub fn verdict_total(&self) -> u64 {
        self.accepted
            + self.runtime_error
            + self.time_limit_exceeded
            + self.execution_failed
            + self.internal_error
    }
}

/// Storage capability for the metrics snapshot. Injectable so tests can
/// substitute an in-memory fake and a future concurrent implementation can
/// add locking without touching the engine.
pub trait MetricsStore: Send + Sync {
    /// Load the current snapshot. Absent or unreadable storage yields a
    /// zeroed snapshot rather than an error.
    fn load(&self) -> MetricsSnapshot;

    /// Persist the snapshot as a whole.
    fn save(&self, snapshot: &MetricsSnapshot) -> io::Result<()>;
}

/// JSON-file-backed metrics store.
pub struct FileMetricsStore {
    path: PathBuf,
}

impl FileMetricsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetricsStore for FileMetricsStore {
    fn load(&self) -> MetricsSnapshot {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = ?self.path, error = %e, "Metrics file unreadable, starting from zero");
                MetricsSnapshot::default()
            }),
            Err(_) => MetricsSnapshot::default(),
        }
    }

    fn save(&self, snapshot: &MetricsSnapshot) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, json)
    }
}

/// Record one execution result: load, increment the total and exactly one
/// per-verdict counter, stamp `last_updated`, persist the whole snapshot.
/// On a persistence failure the in-memory update is dropped and the error
/// is swallowed.
pub fn record(store: &dyn MetricsStore, result: &ExecutionResult) {
    let mut snapshot = store.load();
    snapshot.apply(result.status);
    snapshot.last_updated = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    if let Err(e) = store.save(&snapshot) {
        warn!(error = %e, "Failed to persist metrics, update dropped");
    }
}
