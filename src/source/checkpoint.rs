use super::tracker::SourcePosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk snapshot of one lab's read positions. Only position-tracking
/// state survives a restart; cooldowns and pending anomalies do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub positions: HashMap<PathBuf, SourcePosition>,
}

/// Loads and saves one lab's offset checkpoint file.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path, lab_id: &str) -> Self {
        Self {
            path: dir.join(format!("{}.offsets.json", lab_id)),
        }
    }

    pub fn load(&self) -> Result<Option<HashMap<PathBuf, SourcePosition>>, CheckpointError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&raw)?;
        if checkpoint.version != CURRENT_VERSION {
            tracing::warn!(
                found = checkpoint.version,
                expected = CURRENT_VERSION,
                path = %self.path.display(),
                "Checkpoint version mismatch, ignoring checkpoint"
            );
            return Ok(None);
        }

        tracing::info!(
            sources = checkpoint.positions.len(),
            saved_at = %checkpoint.saved_at,
            "Loaded offset checkpoint"
        );
        Ok(Some(checkpoint.positions))
    }

    pub fn save(&self, positions: &HashMap<PathBuf, SourcePosition>) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let checkpoint = Checkpoint {
            version: CURRENT_VERSION,
            saved_at: Utc::now(),
            positions: positions.clone(),
        };

        // Write-then-rename so a crash mid-save never corrupts the checkpoint
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&checkpoint)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(sources = positions.len(), "Offset checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "lab1");

        let mut positions = HashMap::new();
        positions.insert(
            PathBuf::from("/var/log/fixture.log"),
            SourcePosition {
                offset: 12345,
                identity: 67890,
            },
        );

        store.save(&positions).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, positions);
    }

    #[test]
    fn test_missing_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "lab1");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_version_mismatch_ignored() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "lab1");

        let checkpoint = Checkpoint {
            version: 999,
            saved_at: Utc::now(),
            positions: HashMap::new(),
        };
        std::fs::write(
            dir.path().join("lab1.offsets.json"),
            serde_json::to_vec(&checkpoint).unwrap(),
        )
        .unwrap();

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_labs_have_separate_files() {
        let dir = TempDir::new().unwrap();
        let store1 = CheckpointStore::new(dir.path(), "lab1");
        let store2 = CheckpointStore::new(dir.path(), "lab2");

        let mut positions = HashMap::new();
        positions.insert(
            PathBuf::from("/var/log/fixture.log"),
            SourcePosition { offset: 7, identity: 1 },
        );
        store1.save(&positions).unwrap();

        assert!(store2.load().unwrap().is_none());
        assert!(store1.load().unwrap().is_some());
    }
}
