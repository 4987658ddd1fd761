use crate::anomaly::Anomaly;
use crate::classify::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct AlertError(pub String);

/// Fire-and-forget alert delivery. Failures are logged by the coordinator and
/// never propagate back into anomaly detection.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, lab_id: &str, message: &str) -> Result<(), AlertError>;
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct RemediationError(pub String);

/// Result of one remediation invocation.
#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    pub analysis: String,
    pub suggestion: String,
}

/// The remediation pipeline boundary: one blocking call per invocation,
/// no partial results. Retrieval and response generation happen behind it.
#[async_trait]
pub trait Remediation: Send + Sync {
    async fn handle(
        &self,
        lab_id: &str,
        anomalies: &[Anomaly],
    ) -> Result<RemediationOutcome, RemediationError>;
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HintError(pub String);

/// A remediation result surfaced to the test rig.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub anomaly: String,
    pub analysis: String,
    pub suggestion: String,
    pub status: HintStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintStatus {
    Unresolved,
    Resolved,
}

/// On-screen hint surface consumed by the test rig. Publish failures are
/// non-fatal to the coordinator.
#[async_trait]
pub trait HintSurface: Send + Sync {
    async fn publish(&self, lab_id: &str, hint: &Hint) -> Result<(), HintError>;
    async fn clear(&self, lab_id: &str) -> Result<(), HintError>;
}
