pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LABWATCH CONFIGURATION
# =============================================================================
# Labwatch monitors append-only log streams produced by running test fixtures,
# detects anomalous content and stalled processes, and escalates qualifying
# anomalies to alerting channels (and optionally a remediation pipeline).
#
# Each lab is a fully isolated monitoring scope: offsets, pending anomalies,
# cooldowns and liveness state are never shared across labs.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/labwatch/config.yml
#   3. /etc/labwatch/config.yml

labs:
  lab1:
    # Log files monitored for this lab
    sources:
      - /var/log/lab1/fixture.log
      - /var/log/lab1/runner.log

    # Directory for the hint surface consumed by the test rig (optional)
    hints_dir: /var/lib/labwatch/hints/lab1

    # Invoke the remediation pipeline for escalated anomalies
    auto_trigger: false

    # Suppress repeat escalations of the same anomaly signature
    cooldown: 5m

    # Raise a stall anomaly after this much heartbeat silence
    liveness_timeout: 30s

    # How often the liveness sweep runs
    sweep_interval: 5s

    # How often sources are polled for new content
    poll_interval: 500ms

    # Lines longer than this are truncated (or rejected) before classification
    max_line_bytes: 8192
    oversize: truncate

    # Lines matching this regex count as heartbeats and are not classified
    heartbeat_pattern: '\bHEARTBEAT\b'

    # Optional webhook for alert delivery, in addition to the log sink
    # alert_webhook: https://hooks.example.com/services/XXX

# Optional allow-list. When present, registry lookups for ids outside this
# list fail instead of lazily constructing a scope.
# allowed_labs:
#   - lab1

# Per-lab offset checkpoints, so position tracking resumes across restarts.
# Cooldown and pending-anomaly state is deliberately NOT persisted: a restart
# resets cooldown windows and drops undrained anomalies.
checkpoint:
  enabled: true
  dir: labwatch_state
  interval_seconds: 30
"#
    .to_string()
}
