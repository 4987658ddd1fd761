pub mod runner;

use crate::anomaly::{Aggregator, Anomaly, RateLimiter};
use crate::classify::{Classifier, MaskingClassifier, MiningAdapter};
use crate::config::{Config, LabConfig};
use crate::escalate::{
    AlertSink, EscalationCoordinator, FileHintSurface, HintSurface, LogAlertSink, Remediation,
    WebhookAlertSink,
};
use crate::liveness::LivenessWatcher;
use crate::source::{CheckpointStore, PositionTracker, SourcePosition};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum LabError {
    #[error("unknown lab: {0}")]
    UnknownLab(String),

    #[error("invalid heartbeat pattern for lab '{lab_id}': {error}")]
    HeartbeatPattern { lab_id: String, error: String },
}

/// Collaborators injected at scope construction. Everything behind these
/// traits is out of scope for the monitoring core.
pub struct ScopeDeps {
    pub classifier: Arc<dyn Classifier>,
    pub alerts: Vec<Arc<dyn AlertSink>>,
    pub remediation: Option<Arc<dyn Remediation>>,
    pub hints: Option<Arc<dyn HintSurface>>,
}

impl ScopeDeps {
    /// Default wiring used by the binary: built-in template miner, log sink
    /// plus optional webhook, file hints when a hints dir is configured, and
    /// no remediation pipeline attached.
    pub fn defaults_for(lab_config: &LabConfig) -> Self {
        let mut alerts: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
        if let Some(url) = &lab_config.alert_webhook {
            alerts.push(Arc::new(WebhookAlertSink::new(url.clone())));
        }

        let hints: Option<Arc<dyn HintSurface>> = lab_config
            .hints_dir
            .as_ref()
            .map(|dir| Arc::new(FileHintSurface::new(dir.clone())) as Arc<dyn HintSurface>);

        Self {
            classifier: Arc::new(MaskingClassifier::new()),
            alerts,
            remediation: None,
            hints,
        }
    }
}

/// One isolated monitoring context. Owns every piece of mutable state for a
/// lab; nothing here is shared across lab boundaries.
pub struct LabScope {
    pub lab_id: String,
    pub config: LabConfig,
    pub tracker: PositionTracker,
    pub adapter: MiningAdapter,
    pub aggregator: Aggregator,
    pub limiter: RateLimiter,
    pub liveness: LivenessWatcher,
    pub coordinator: EscalationCoordinator,
    heartbeat: Regex,
    carry: Mutex<HashMap<PathBuf, Vec<u8>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LabScope {
    pub fn new(
        lab_id: &str,
        config: LabConfig,
        deps: ScopeDeps,
        positions: Option<HashMap<PathBuf, SourcePosition>>,
    ) -> Result<Arc<Self>, LabError> {
        let heartbeat =
            Regex::new(&config.heartbeat_pattern).map_err(|e| LabError::HeartbeatPattern {
                lab_id: lab_id.to_string(),
                error: e.to_string(),
            })?;

        let tracker = match positions {
            Some(positions) => PositionTracker::with_positions(positions),
            None => PositionTracker::new(),
        };

        let adapter = MiningAdapter::new(deps.classifier, config.max_line_bytes, config.oversize);
        let coordinator = EscalationCoordinator::new(
            lab_id.to_string(),
            config.auto_trigger,
            deps.alerts,
            deps.remediation,
            deps.hints,
        );

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            lab_id: lab_id.to_string(),
            limiter: RateLimiter::new(config.cooldown),
            liveness: LivenessWatcher::new(config.liveness_timeout),
            aggregator: Aggregator::new(),
            tracker,
            adapter,
            coordinator,
            heartbeat,
            config,
            carry: Mutex::new(HashMap::new()),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Take all pending anomalies in detection order. This is the interface
    /// the agent-tool layer uses ("check logs"); each anomaly is returned
    /// exactly once.
    pub fn drain_anomalies(&self) -> Vec<Anomaly> {
        self.aggregator.drain()
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub(crate) fn store_tasks(&self, handles: Vec<JoinHandle<()>>) {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(handles);
    }

    /// Stop this lab's background watchers and wait for them to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<_> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            tasks.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(lab = %self.lab_id, error = %e, "Watcher task join error");
                }
            }
        }
        info!(lab = %self.lab_id, "Lab monitoring stopped");
    }
}

/// Supplies one LabScope per lab id, constructed lazily and exactly once.
///
/// Construction (including watcher spawning) happens under the registry lock,
/// so concurrent `get` calls for the same id never build duplicate scopes or
/// duplicate background watchers.
pub struct LabRegistry {
    config: Config,
    deps_factory: Box<dyn Fn(&str, &LabConfig) -> ScopeDeps + Send + Sync>,
    labs: Mutex<HashMap<String, Arc<LabScope>>>,
}

impl LabRegistry {
    pub fn new(config: Config) -> Self {
        Self::with_deps_factory(config, |_, lab_config| ScopeDeps::defaults_for(lab_config))
    }

    /// Build a registry with custom collaborator wiring, e.g. to attach a
    /// remediation pipeline or replace the classifier.
    pub fn with_deps_factory(
        config: Config,
        deps_factory: impl Fn(&str, &LabConfig) -> ScopeDeps + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            deps_factory: Box::new(deps_factory),
            labs: Mutex::new(HashMap::new()),
        }
    }

    /// Get or lazily construct the scope for `lab_id`.
    ///
    /// Must be called from within a tokio runtime, since first access spawns
    /// the lab's background watchers.
    pub fn get(&self, lab_id: &str) -> Result<Arc<LabScope>, LabError> {
        if let Some(allowed) = &self.config.allowed_labs {
            if !allowed.iter().any(|id| id == lab_id) {
                return Err(LabError::UnknownLab(lab_id.to_string()));
            }
        }
        let Some(lab_config) = self.config.labs.get(lab_id) else {
            return Err(LabError::UnknownLab(lab_id.to_string()));
        };

        let mut labs = self.labs.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(scope) = labs.get(lab_id) {
            return Ok(scope.clone());
        }

        let deps = (self.deps_factory)(lab_id, lab_config);

        let checkpoint = if self.config.checkpoint.enabled {
            Some(CheckpointStore::new(&self.config.checkpoint.dir, lab_id))
        } else {
            None
        };
        // A broken checkpoint is not fatal; monitoring starts from scratch
        let positions = match &checkpoint {
            Some(store) => match store.load() {
                Ok(positions) => positions,
                Err(e) => {
                    warn!(lab = %lab_id, error = %e, "Failed to load offset checkpoint, starting fresh");
                    None
                }
            },
            None => None,
        };

        let scope = LabScope::new(lab_id, lab_config.clone(), deps, positions)?;
        runner::spawn_watchers(
            &scope,
            checkpoint,
            std::time::Duration::from_secs(self.config.checkpoint.interval_seconds),
        );
        info!(lab = %lab_id, sources = scope.config.sources.len(), "Lab scope constructed");

        labs.insert(lab_id.to_string(), scope.clone());
        Ok(scope)
    }

    pub fn active_labs(&self) -> Vec<String> {
        let labs = self.labs.lock().unwrap_or_else(|p| p.into_inner());
        labs.keys().cloned().collect()
    }

    /// Stop monitoring for one lab and drop its scope.
    pub async fn stop(&self, lab_id: &str) {
        let scope = {
            let mut labs = self.labs.lock().unwrap_or_else(|p| p.into_inner());
            labs.remove(lab_id)
        };
        if let Some(scope) = scope {
            scope.shutdown().await;
        }
    }

    pub async fn shutdown_all(&self) {
        let scopes: Vec<_> = {
            let mut labs = self.labs.lock().unwrap_or_else(|p| p.into_inner());
            labs.drain().map(|(_, scope)| scope).collect()
        };
        for scope in scopes {
            scope.shutdown().await;
        }
    }
}
