use super::types::Config;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let expanded = expand_env_vars(&raw);
    let mut config: Config = serde_yaml::from_str(&expanded)?;

    for lab in config.labs.values_mut() {
        lab.sources = lab.sources.iter().map(|p| expand_tilde(p)).collect();
        if let Some(dir) = &lab.hints_dir {
            lab.hints_dir = Some(expand_tilde(dir));
        }
    }
    config.checkpoint.dir = expand_tilde(&config.checkpoint.dir);

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.labs.is_empty() {
        errors.push("no labs configured".to_string());
    }

    for (lab_id, lab) in &config.labs {
        if lab.sources.is_empty() {
            errors.push(format!("lab '{}': no sources configured", lab_id));
        }
        if lab.max_line_bytes == 0 {
            errors.push(format!("lab '{}': max_line_bytes must be non-zero", lab_id));
        }
        if lab.cooldown.is_zero() {
            errors.push(format!("lab '{}': cooldown must be non-zero", lab_id));
        }
        // Zero-period intervals would panic the watcher tasks
        if lab.poll_interval.is_zero() {
            errors.push(format!("lab '{}': poll_interval must be non-zero", lab_id));
        }
        if lab.sweep_interval.is_zero() {
            errors.push(format!("lab '{}': sweep_interval must be non-zero", lab_id));
        }
        if let Err(e) = Regex::new(&lab.heartbeat_pattern) {
            errors.push(format!("lab '{}': invalid heartbeat_pattern: {}", lab_id, e));
        }
    }

    if config.checkpoint.enabled && config.checkpoint.interval_seconds == 0 {
        errors.push("checkpoint: interval_seconds must be non-zero".to_string());
    }

    if let Some(allowed) = &config.allowed_labs {
        for lab_id in config.labs.keys() {
            if !allowed.contains(lab_id) {
                errors.push(format!(
                    "lab '{}' is configured but missing from allowed_labs",
                    lab_id
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - /var/log/fixture.log
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.labs.len(), 1);
        assert!(config.allowed_labs.is_none());
        assert!(config.checkpoint.enabled);
    }

    #[test]
    fn test_no_labs_rejected() {
        let file = write_config("labs: {}\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationList(_))));
    }

    #[test]
    fn test_lab_without_sources_rejected() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources: []
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_lab_outside_allow_list_rejected() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - /var/log/fixture.log
allowed_labs:
  - lab2
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_watcher_intervals_rejected() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - /var/log/fixture.log
    poll_interval: 0ms
    sweep_interval: 0s
"#,
        );
        match load_config(file.path()) {
            Err(ConfigError::ValidationList(errors)) => {
                assert!(errors.iter().any(|e| e.contains("poll_interval")));
                assert!(errors.iter().any(|e| e.contains("sweep_interval")));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_checkpoint_interval_rejected() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - /var/log/fixture.log
checkpoint:
  enabled: true
  interval_seconds: 0
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_checkpoint_interval_ok_when_disabled() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - /var/log/fixture.log
checkpoint:
  enabled: false
  interval_seconds: 0
"#,
        );
        assert!(load_config(file.path()).is_ok());
    }

    #[test]
    fn test_invalid_heartbeat_pattern_rejected() {
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - /var/log/fixture.log
    heartbeat_pattern: "[unclosed"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("LABWATCH_TEST_LOG_DIR", "/tmp/labwatch-test");
        let file = write_config(
            r#"
labs:
  lab1:
    sources:
      - $env{LABWATCH_TEST_LOG_DIR}/fixture.log
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.labs["lab1"].sources[0],
            std::path::PathBuf::from("/tmp/labwatch-test/fixture.log")
        );
    }
}
