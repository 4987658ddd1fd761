pub mod cooldown;

use crate::classify::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub use cooldown::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A previously unseen log template.
    NewTemplate,
    /// A new anomalous cluster.
    NewCluster,
    /// Heartbeat silence exceeded the liveness timeout.
    Stalled,
}

/// One detected anomaly. Immutable once created; removed only by a drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub lab_id: String,
    pub source: PathBuf,
    pub kind: AnomalyKind,
    /// Template/cluster signature; the dedup and cooldown key.
    pub signature: String,
    pub severity: Severity,
    pub excerpt: String,
    pub detected_at: DateTime<Utc>,
}

/// Thread-safe ordered collection of pending anomalies for one lab.
///
/// `record` appends under the lock; `drain` atomically takes everything, so
/// concurrent producers never lose an anomaly to a racing drain and no drain
/// returns the same anomaly twice.
pub struct Aggregator {
    pending: Mutex<Vec<Anomaly>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, anomaly: Anomaly) {
        self.lock().push(anomaly);
    }

    /// Take all pending anomalies in detection order, leaving the collection
    /// empty.
    pub fn drain(&self) -> Vec<Anomaly> {
        std::mem::take(&mut *self.lock())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Anomaly>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
