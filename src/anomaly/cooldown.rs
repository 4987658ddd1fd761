use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-signature escalation rate limiter for one lab.
///
/// `allow` is atomic with its own state update: the decision and the cooldown
/// refresh happen under one lock, so two callers can never both be granted
/// the same signature within one cooldown window. Expired entries are evicted
/// lazily on each call.
pub struct RateLimiter {
    cooldown: Duration,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(cooldown: std::time::Duration) -> Self {
        Self {
            cooldown: Duration::from_std(cooldown).unwrap_or(Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true and arms the cooldown iff no unexpired entry exists for
    /// `signature`; otherwise returns false with no side effects.
    pub fn allow(&self, signature: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|_, expires_at| *expires_at > now);

        if entries.contains_key(signature) {
            return false;
        }

        entries.insert(signature.to_string(), now + self.cooldown);
        true
    }

    pub fn active_cooldowns(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
