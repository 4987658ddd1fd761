pub mod alerts;
pub mod hints;
pub mod traits;

use crate::anomaly::Anomaly;
use crate::classify::Severity;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub use alerts::{LogAlertSink, WebhookAlertSink};
pub use hints::FileHintSurface;
pub use traits::{
    AlertError, AlertSink, Hint, HintError, HintStatus, HintSurface, Remediation,
    RemediationError, RemediationOutcome,
};

/// Fan-out point for anomalies that cleared the rate-limit gate.
///
/// Every escalated anomaly is forwarded to all alert sinks. When auto-trigger
/// is enabled, the remediation pipeline is additionally invoked under a
/// per-lab single-flight guard: anomalies arriving while an invocation is in
/// flight are queued and covered by exactly one follow-up invocation.
pub struct EscalationCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    lab_id: String,
    auto_trigger: bool,
    alerts: Vec<Arc<dyn AlertSink>>,
    remediation: Option<Arc<dyn Remediation>>,
    hints: Option<Arc<dyn HintSurface>>,
    flight: Mutex<FlightState>,
}

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    pending: Vec<Anomaly>,
}

impl EscalationCoordinator {
    pub fn new(
        lab_id: String,
        auto_trigger: bool,
        alerts: Vec<Arc<dyn AlertSink>>,
        remediation: Option<Arc<dyn Remediation>>,
        hints: Option<Arc<dyn HintSurface>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lab_id,
                auto_trigger,
                alerts,
                remediation,
                hints,
                flight: Mutex::new(FlightState::default()),
            }),
        }
    }

    /// Forward one gate-cleared anomaly: alert always, remediate if enabled.
    pub async fn escalate(&self, anomaly: Anomaly) {
        let message = format_alert(&anomaly);
        for sink in &self.inner.alerts {
            if let Err(e) = sink.notify(&self.inner.lab_id, &message).await {
                warn!(lab = %self.inner.lab_id, error = %e, "Alert delivery failed");
            }
        }

        if !self.inner.auto_trigger {
            return;
        }
        let Some(remediation) = self.inner.remediation.clone() else {
            debug!(lab = %self.inner.lab_id, "Auto-trigger enabled but no remediation pipeline attached");
            return;
        };

        let start_drain = {
            let mut flight = self.inner.flight.lock().unwrap_or_else(|p| p.into_inner());
            flight.pending.push(anomaly);
            if flight.in_flight {
                // Queued; covered by the in-flight drain's follow-up pass
                false
            } else {
                flight.in_flight = true;
                true
            }
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drain_flight(remediation).await });
        }
    }

    /// True while a remediation invocation is running or queued.
    pub fn remediation_in_flight(&self) -> bool {
        let flight = self.inner.flight.lock().unwrap_or_else(|p| p.into_inner());
        flight.in_flight
    }
}

impl Inner {
    /// Repeatedly take the pending batch and run one remediation invocation
    /// over it, until nothing new arrived mid-flight. At most one invocation
    /// runs per lab at any time.
    async fn drain_flight(self: Arc<Self>, remediation: Arc<dyn Remediation>) {
        loop {
            let batch = {
                let mut flight = self.flight.lock().unwrap_or_else(|p| p.into_inner());
                if flight.pending.is_empty() {
                    flight.in_flight = false;
                    return;
                }
                std::mem::take(&mut flight.pending)
            };

            match remediation.handle(&self.lab_id, &batch).await {
                Ok(outcome) => {
                    info!(
                        lab = %self.lab_id,
                        anomalies = batch.len(),
                        "Remediation invocation completed"
                    );
                    self.publish_hint(&batch, &outcome).await;
                }
                Err(e) => {
                    // Recoverable: future anomalies still trigger new invocations
                    warn!(lab = %self.lab_id, error = %e, "Remediation invocation failed");
                }
            }
        }
    }

    async fn publish_hint(&self, batch: &[Anomaly], outcome: &RemediationOutcome) {
        let Some(hints) = &self.hints else { return };

        let severity = batch
            .iter()
            .map(|a| a.severity)
            .max()
            .unwrap_or(Severity::Warning);
        let hint = Hint {
            timestamp: Utc::now(),
            severity,
            anomaly: batch
                .iter()
                .map(|a| a.excerpt.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            analysis: outcome.analysis.clone(),
            suggestion: outcome.suggestion.clone(),
            status: HintStatus::Unresolved,
        };

        if let Err(e) = hints.publish(&self.lab_id, &hint).await {
            warn!(lab = %self.lab_id, error = %e, "Hint publish failed");
        }
    }
}

fn format_alert(anomaly: &Anomaly) -> String {
    format!(
        "[{}] {} anomaly in {} (signature {}): {}",
        anomaly.severity,
        match anomaly.kind {
            crate::anomaly::AnomalyKind::NewTemplate => "new-template",
            crate::anomaly::AnomalyKind::NewCluster => "new-cluster",
            crate::anomaly::AnomalyKind::Stalled => "stalled-process",
        },
        anomaly.source.display(),
        anomaly.signature,
        anomaly.excerpt
    )
}
