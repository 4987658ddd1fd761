use super::traits::{Hint, HintError, HintStatus, HintSurface};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Hints kept in the current file; older ones live only in the history log.
const MAX_CURRENT_HINTS: usize = 10;

/// File-based hint surface: a JSON file of current unresolved hints that the
/// test rig polls, plus an append-only JSONL history.
pub struct FileHintSurface {
    dir: PathBuf,
}

impl FileHintSurface {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join("current_hints.json")
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join("hints_history.jsonl")
    }

    async fn read_current(&self) -> Vec<Hint> {
        match tokio::fs::read_to_string(self.current_path()).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn write_current(&self, hints: &[Hint]) -> Result<(), HintError> {
        let json = serde_json::to_vec_pretty(hints).map_err(|e| HintError(e.to_string()))?;
        tokio::fs::write(self.current_path(), json)
            .await
            .map_err(|e| HintError(e.to_string()))
    }

    async fn append_history(&self, hint: &Hint) -> Result<(), HintError> {
        let mut line = serde_json::to_string(hint).map_err(|e| HintError(e.to_string()))?;
        line.push('\n');

        let mut existing = tokio::fs::read(self.history_path()).await.unwrap_or_default();
        existing.extend_from_slice(line.as_bytes());
        tokio::fs::write(self.history_path(), existing)
            .await
            .map_err(|e| HintError(e.to_string()))
    }

    async fn ensure_dir(&self, _lab_id: &str) -> Result<(), HintError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HintError(e.to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl HintSurface for FileHintSurface {
    async fn publish(&self, lab_id: &str, hint: &Hint) -> Result<(), HintError> {
        self.ensure_dir(lab_id).await?;

        let mut current = self.read_current().await;
        current.push(hint.clone());
        current.retain(|h| h.status == HintStatus::Unresolved);
        if current.len() > MAX_CURRENT_HINTS {
            let drop = current.len() - MAX_CURRENT_HINTS;
            current.drain(..drop);
        }
        self.write_current(&current).await?;

        self.append_history(hint).await
    }

    async fn clear(&self, lab_id: &str) -> Result<(), HintError> {
        self.ensure_dir(lab_id).await?;
        self.write_current(&[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Severity;
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_hint(anomaly: &str) -> Hint {
        Hint {
            timestamp: Utc::now(),
            severity: Severity::Error,
            anomaly: anomaly.to_string(),
            analysis: "analysis".to_string(),
            suggestion: "suggestion".to_string(),
            status: HintStatus::Unresolved,
        }
    }

    #[tokio::test]
    async fn test_publish_and_read_back() {
        let dir = TempDir::new().unwrap();
        let surface = FileHintSurface::new(dir.path().to_path_buf());

        surface.publish("lab1", &make_hint("ERROR boom")).await.unwrap();

        let current = surface.read_current().await;
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].anomaly, "ERROR boom");
    }

    #[tokio::test]
    async fn test_current_capped_to_ten() {
        let dir = TempDir::new().unwrap();
        let surface = FileHintSurface::new(dir.path().to_path_buf());

        for i in 0..15 {
            surface
                .publish("lab1", &make_hint(&format!("anomaly-{}", i)))
                .await
                .unwrap();
        }

        let current = surface.read_current().await;
        assert_eq!(current.len(), 10);
        // Oldest hints dropped, newest kept
        assert_eq!(current[0].anomaly, "anomaly-5");
        assert_eq!(current[9].anomaly, "anomaly-14");
    }

    #[tokio::test]
    async fn test_history_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let surface = FileHintSurface::new(dir.path().to_path_buf());

        for i in 0..12 {
            surface
                .publish("lab1", &make_hint(&format!("anomaly-{}", i)))
                .await
                .unwrap();
        }

        let history = tokio::fs::read_to_string(surface.history_path()).await.unwrap();
        assert_eq!(history.lines().count(), 12);
    }

    #[tokio::test]
    async fn test_clear_empties_current_only() {
        let dir = TempDir::new().unwrap();
        let surface = FileHintSurface::new(dir.path().to_path_buf());

        surface.publish("lab1", &make_hint("a")).await.unwrap();
        surface.clear("lab1").await.unwrap();

        assert!(surface.read_current().await.is_empty());
        let history = tokio::fs::read_to_string(surface.history_path()).await.unwrap();
        assert_eq!(history.lines().count(), 1);
    }
}
