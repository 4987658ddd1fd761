use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Active,
    Stalled,
}

#[derive(Debug, Clone)]
struct SourceLiveness {
    last_heartbeat: DateTime<Utc>,
    state: LivenessState,
}

/// Emitted once per uninterrupted stall period when a source crosses the
/// silence timeout.
#[derive(Debug, Clone)]
pub struct StallEvent {
    pub source: PathBuf,
    pub last_heartbeat: DateTime<Utc>,
    pub silent_for: Duration,
}

/// Heartbeat-based liveness tracking for one lab's sources.
///
/// State machine per source: ACTIVE -(silence > timeout)-> STALLED
/// -(heartbeat observed)-> ACTIVE. The sweep emits exactly one stall event
/// per uninterrupted stall; recovery is logged but never escalates.
pub struct LivenessWatcher {
    timeout: Duration,
    sources: Mutex<HashMap<PathBuf, SourceLiveness>>,
}

impl LivenessWatcher {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            timeout: Duration::from_std(timeout).unwrap_or(Duration::MAX),
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Register a source on first observed activity. The silence window
    /// starts at `now`; a no-op for sources already tracked.
    pub fn track(&self, source: &Path, now: DateTime<Utc>) {
        self.lock()
            .entry(source.to_path_buf())
            .or_insert(SourceLiveness {
                last_heartbeat: now,
                state: LivenessState::Active,
            });
    }

    /// Record a heartbeat observed on `source` at time `at`.
    pub fn heartbeat(&self, source: &Path, at: DateTime<Utc>) {
        let mut sources = self.lock();
        let entry = sources
            .entry(source.to_path_buf())
            .or_insert(SourceLiveness {
                last_heartbeat: at,
                state: LivenessState::Active,
            });

        if at > entry.last_heartbeat {
            entry.last_heartbeat = at;
        }
        if entry.state == LivenessState::Stalled {
            entry.state = LivenessState::Active;
            info!(source = %source.display(), "Heartbeat resumed after stall");
        }
    }

    /// Compare silence against the timeout for every tracked source and
    /// transition newly silent sources to STALLED.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<StallEvent> {
        let mut stalled = Vec::new();
        let mut sources = self.lock();

        for (source, liveness) in sources.iter_mut() {
            if liveness.state == LivenessState::Active
                && now - liveness.last_heartbeat > self.timeout
            {
                liveness.state = LivenessState::Stalled;
                stalled.push(StallEvent {
                    source: source.clone(),
                    last_heartbeat: liveness.last_heartbeat,
                    silent_for: now - liveness.last_heartbeat,
                });
            }
        }

        stalled
    }

    pub fn state(&self, source: &Path) -> Option<LivenessState> {
        self.lock().get(source).map(|l| l.state)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, SourceLiveness>> {
        self.sources.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn watcher() -> LivenessWatcher {
        LivenessWatcher::new(StdDuration::from_secs(30))
    }

    #[test]
    fn test_silence_past_timeout_emits_exactly_one_stall() {
        let watcher = watcher();
        let path = PathBuf::from("/var/log/fixture.log");
        let t0 = Utc::now();

        watcher.track(&path, t0);
        assert!(watcher.sweep(t0 + Duration::seconds(30)).is_empty());

        let stalls = watcher.sweep(t0 + Duration::seconds(31));
        assert_eq!(stalls.len(), 1);
        assert_eq!(stalls[0].source, path);
        assert_eq!(watcher.state(&path), Some(LivenessState::Stalled));

        // Same uninterrupted stall: no second event
        assert!(watcher.sweep(t0 + Duration::seconds(120)).is_empty());
    }

    #[test]
    fn test_heartbeat_resets_silence_window() {
        let watcher = watcher();
        let path = PathBuf::from("/var/log/fixture.log");
        let t0 = Utc::now();

        watcher.track(&path, t0);
        watcher.heartbeat(&path, t0 + Duration::seconds(20));

        // 31s after t0 but only 11s after the heartbeat
        assert!(watcher.sweep(t0 + Duration::seconds(31)).is_empty());
        assert_eq!(watcher.state(&path), Some(LivenessState::Active));
    }

    #[test]
    fn test_recovery_then_new_stall_emits_again() {
        let watcher = watcher();
        let path = PathBuf::from("/var/log/fixture.log");
        let t0 = Utc::now();

        watcher.track(&path, t0);
        assert_eq!(watcher.sweep(t0 + Duration::seconds(31)).len(), 1);

        watcher.heartbeat(&path, t0 + Duration::seconds(40));
        assert_eq!(watcher.state(&path), Some(LivenessState::Active));

        // A fresh stall period produces a fresh event
        assert_eq!(watcher.sweep(t0 + Duration::seconds(71)).len(), 1);
    }

    #[test]
    fn test_stale_heartbeat_does_not_move_clock_backwards() {
        let watcher = watcher();
        let path = PathBuf::from("/var/log/fixture.log");
        let t0 = Utc::now();

        watcher.heartbeat(&path, t0 + Duration::seconds(20));
        watcher.heartbeat(&path, t0);

        assert!(watcher.sweep(t0 + Duration::seconds(45)).is_empty());
    }

    #[test]
    fn test_sources_stall_independently() {
        let watcher = watcher();
        let a = PathBuf::from("/var/log/a.log");
        let b = PathBuf::from("/var/log/b.log");
        let t0 = Utc::now();

        watcher.track(&a, t0);
        watcher.track(&b, t0);
        watcher.heartbeat(&b, t0 + Duration::seconds(25));

        let stalls = watcher.sweep(t0 + Duration::seconds(31));
        assert_eq!(stalls.len(), 1);
        assert_eq!(stalls[0].source, a);
    }
}
