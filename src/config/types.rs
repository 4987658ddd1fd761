use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub labs: HashMap<String, LabConfig>,
    /// Optional allow-list. When present, registry lookups for ids outside
    /// this list are rejected instead of lazily constructing a scope.
    #[serde(default)]
    pub allowed_labs: Option<Vec<String>>,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// Log files monitored for this lab.
    pub sources: Vec<PathBuf>,
    /// Directory for the file-based hint surface. Hints are disabled when unset.
    #[serde(default)]
    pub hints_dir: Option<PathBuf>,
    /// Invoke the remediation pipeline for escalated anomalies.
    #[serde(default)]
    pub auto_trigger: bool,
    #[serde(default = "default_cooldown", with = "duration_format")]
    pub cooldown: Duration,
    #[serde(default = "default_liveness_timeout", with = "duration_format")]
    pub liveness_timeout: Duration,
    #[serde(default = "default_sweep_interval", with = "duration_format")]
    pub sweep_interval: Duration,
    #[serde(default = "default_poll_interval", with = "duration_format")]
    pub poll_interval: Duration,
    /// Input bound enforced by the template-mining adapter.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    #[serde(default)]
    pub oversize: OversizePolicy,
    /// Lines matching this regex count as heartbeats and are not classified.
    #[serde(default = "default_heartbeat_pattern")]
    pub heartbeat_pattern: String,
    /// Optional webhook URL for alert delivery, in addition to the log sink.
    #[serde(default)]
    pub alert_webhook: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Cut oversized lines down to the input bound before classification.
    #[default]
    Truncate,
    /// Fail classification of oversized lines.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_enabled")]
    pub enabled: bool,
    /// Directory holding one offsets file per lab.
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_checkpoint_interval")]
    pub interval_seconds: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: default_checkpoint_enabled(),
            dir: default_checkpoint_dir(),
            interval_seconds: default_checkpoint_interval(),
        }
    }
}

fn default_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_liveness_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_max_line_bytes() -> usize {
    8192
}

fn default_heartbeat_pattern() -> String {
    r"\bHEARTBEAT\b".to_string()
}

fn default_checkpoint_enabled() -> bool {
    true
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("labwatch_state")
}

fn default_checkpoint_interval() -> u64 {
    30
}

// Custom serde module for duration parsing ("500ms", "30s", "5m", "1h")
mod duration_format {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }

        let (value_str, unit) = if s.ends_with("ms") {
            (&s[..s.len() - 2], "ms")
        } else if s.ends_with('s') {
            (&s[..s.len() - 1], "s")
        } else if s.ends_with('m') {
            (&s[..s.len() - 1], "m")
        } else if s.ends_with('h') {
            (&s[..s.len() - 1], "h")
        } else {
            return Err(format!("invalid duration format: {}", s));
        };

        let value: u64 = value_str
            .parse()
            .map_err(|_| format!("invalid numeric value: {}", value_str))?;

        let duration = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(format!("unknown unit: {}", unit)),
        };

        Ok(duration)
    }

    fn format_duration(d: Duration) -> String {
        let secs = d.as_secs();
        if secs % 3600 == 0 && secs > 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 && secs > 0 {
            format!("{}m", secs / 60)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", d.as_millis())
        }
    }
}
