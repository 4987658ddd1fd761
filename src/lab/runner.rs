use super::LabScope;
use crate::anomaly::{Anomaly, AnomalyKind};
use crate::classify::{ChangeKind, ClassifyError, Severity};
use crate::source::CheckpointStore;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl LabScope {
    /// Handle a change notification for one source: read appended bytes,
    /// assemble lines, and run each through heartbeat matching and
    /// classification.
    pub async fn handle_change(&self, path: &Path) {
        let bytes = match self.tracker.read_new(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Offset untouched; the next notification retries
                if !e.is_not_found() {
                    debug!(
                        lab = %self.lab_id,
                        source = %path.display(),
                        error = %e,
                        "Transient source read failure"
                    );
                }
                return;
            }
        };

        let now = Utc::now();
        self.liveness.track(path, now);
        if bytes.is_empty() {
            return;
        }

        for line in self.take_lines(path, &bytes) {
            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(path, &line, now).await;
        }
    }

    async fn handle_line(&self, path: &Path, line: &str, now: DateTime<Utc>) {
        if self.heartbeat.is_match(line) {
            self.liveness.heartbeat(path, now);
            return;
        }

        let source_id = path.to_string_lossy();
        let verdict = match self.adapter.classify(&source_id, line) {
            Ok(verdict) => verdict,
            Err(ClassifyError::InputTooLarge { actual, limit }) => {
                warn!(
                    lab = %self.lab_id,
                    source = %path.display(),
                    actual,
                    limit,
                    "Oversized line rejected"
                );
                return;
            }
            Err(e) => {
                // Unclassified for this cycle; the stream keeps moving
                warn!(
                    lab = %self.lab_id,
                    source = %path.display(),
                    error = %e,
                    "Classification failed, line skipped"
                );
                return;
            }
        };

        if verdict.kind == ChangeKind::None {
            return;
        }

        let anomaly = Anomaly {
            id: Uuid::new_v4(),
            lab_id: self.lab_id.clone(),
            source: path.to_path_buf(),
            kind: match verdict.kind {
                ChangeKind::NewCluster => AnomalyKind::NewCluster,
                _ => AnomalyKind::NewTemplate,
            },
            signature: verdict.signature,
            severity: verdict.severity.unwrap_or(Severity::Warning),
            excerpt: line.to_string(),
            detected_at: now,
        };
        self.record_and_escalate(anomaly).await;
    }

    /// Run one liveness sweep: newly stalled sources become anomalies and go
    /// through the same record/gate/escalate path as classified lines.
    pub async fn run_sweep(&self, now: DateTime<Utc>) {
        for stall in self.liveness.sweep(now) {
            warn!(
                lab = %self.lab_id,
                source = %stall.source.display(),
                silent_secs = stall.silent_for.num_seconds(),
                "Source stalled: heartbeat silence exceeded timeout"
            );
            let anomaly = Anomaly {
                id: Uuid::new_v4(),
                lab_id: self.lab_id.clone(),
                source: stall.source.clone(),
                kind: AnomalyKind::Stalled,
                signature: format!("stalled:{}", stall.source.display()),
                severity: Severity::Error,
                excerpt: format!(
                    "no heartbeat for {}s (last observed {})",
                    stall.silent_for.num_seconds(),
                    stall.last_heartbeat
                ),
                detected_at: now,
            };
            self.record_and_escalate(anomaly).await;
        }
    }

    /// Every detection is recorded; only the rate-limit gate decides whether
    /// it also escalates.
    async fn record_and_escalate(&self, anomaly: Anomaly) {
        self.aggregator.record(anomaly.clone());

        if self.limiter.allow(&anomaly.signature, anomaly.detected_at) {
            self.coordinator.escalate(anomaly).await;
        } else {
            debug!(
                lab = %self.lab_id,
                signature = %anomaly.signature,
                "Escalation suppressed by cooldown"
            );
        }
    }

    /// Append freshly read bytes to the per-source carry buffer and split off
    /// complete lines. A trailing fragment without a newline stays buffered
    /// until the rest of the line arrives; a fragment that outgrows the
    /// line-size bound is force-cut into a line so the carry never exceeds
    /// the bound between notifications.
    fn take_lines(&self, path: &Path, bytes: &[u8]) -> Vec<String> {
        let mut carry = self.carry.lock().unwrap_or_else(|p| p.into_inner());
        let buf = carry.entry(path.to_path_buf()).or_default();
        buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(at) = buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = buf.drain(..=at).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }

        if buf.len() > self.config.max_line_bytes {
            let raw: Vec<u8> = buf.drain(..).collect();
            warn!(
                lab = %self.lab_id,
                source = %path.display(),
                bytes = raw.len(),
                "Unterminated line exceeded the size bound, force-cutting"
            );
            lines.push(String::from_utf8_lossy(&raw).into_owned());
        }
        lines
    }
}

/// Spawn the per-lab background tasks: source poller, liveness sweeper, and
/// (when checkpointing is on) the offset checkpointer.
pub(crate) fn spawn_watchers(
    scope: &Arc<LabScope>,
    checkpoint: Option<CheckpointStore>,
    checkpoint_interval: Duration,
) {
    let mut handles = Vec::new();

    handles.push(tokio::spawn(run_poller(
        Arc::clone(scope),
        scope.subscribe_shutdown(),
    )));
    handles.push(tokio::spawn(run_sweeper(
        Arc::clone(scope),
        scope.subscribe_shutdown(),
    )));
    if let Some(store) = checkpoint {
        handles.push(tokio::spawn(run_checkpointer(
            Arc::clone(scope),
            store,
            checkpoint_interval,
            scope.subscribe_shutdown(),
        )));
    }

    scope.store_tasks(handles);
}

async fn run_poller(scope: Arc<LabScope>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(scope.config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(lab = %scope.lab_id, sources = scope.config.sources.len(), "Source poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sources = scope.config.sources.clone();
                for path in sources {
                    scope.handle_change(&path).await;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(lab = %scope.lab_id, "Source poller stopped");
}

async fn run_sweeper(scope: Arc<LabScope>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(scope.config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scope.run_sweep(Utc::now()).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn run_checkpointer(
    scope: Arc<LabScope>,
    store: CheckpointStore,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                save_checkpoint(&scope, &store);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    // Final save so a clean shutdown loses no offsets
                    save_checkpoint(&scope, &store);
                    break;
                }
            }
        }
    }
}

fn save_checkpoint(scope: &LabScope, store: &CheckpointStore) {
    let snapshot = scope.tracker.snapshot();
    if snapshot.is_empty() {
        return;
    }
    if let Err(e) = store.save(&snapshot) {
        error!(lab = %scope.lab_id, error = %e, "Offset checkpoint save failed");
    }
}
