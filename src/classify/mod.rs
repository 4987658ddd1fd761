pub mod template;

use crate::config::OversizePolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use template::MaskingClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Line matched a known template; nothing new.
    None,
    /// Line produced a previously unseen template.
    NewTemplate,
    /// Line produced a new anomalous cluster.
    NewCluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Verdict from the template-mining oracle for one log line.
#[derive(Debug, Clone)]
pub struct ClassificationVerdict {
    pub kind: ChangeKind,
    /// Opaque template/cluster signature; the dedup and cooldown key.
    pub signature: String,
    pub severity: Option<Severity>,
}

impl ClassificationVerdict {
    pub fn none() -> Self {
        Self {
            kind: ChangeKind::None,
            signature: String::new(),
            severity: None,
        }
    }
}

/// Failure inside the external classifier. The caller treats the line as
/// unclassified for this cycle; the call is not retried.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ClassifierError(pub String);

/// The template-mining oracle seam. Implementations may maintain their own
/// learned state internally; from this side the call is synchronous and
/// side-effect free.
pub trait Classifier: Send + Sync {
    fn classify(&self, source: &str, line: &str) -> Result<ClassificationVerdict, ClassifierError>;
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("input of {actual} bytes exceeds the {limit} byte bound")]
    InputTooLarge { actual: usize, limit: usize },

    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Wraps the external classifier, enforcing the input-size bound before
/// anything crosses the boundary.
pub struct MiningAdapter {
    classifier: Arc<dyn Classifier>,
    max_line_bytes: usize,
    oversize: OversizePolicy,
}

impl MiningAdapter {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        max_line_bytes: usize,
        oversize: OversizePolicy,
    ) -> Self {
        Self {
            classifier,
            max_line_bytes,
            oversize,
        }
    }

    pub fn classify(&self, source: &str, line: &str) -> Result<ClassificationVerdict, ClassifyError> {
        let line = if line.len() > self.max_line_bytes {
            match self.oversize {
                OversizePolicy::Reject => {
                    return Err(ClassifyError::InputTooLarge {
                        actual: line.len(),
                        limit: self.max_line_bytes,
                    })
                }
                OversizePolicy::Truncate => truncate_at_char_boundary(line, self.max_line_bytes),
            }
        } else {
            line
        };

        Ok(self.classifier.classify(source, line)?)
    }
}

fn truncate_at_char_boundary(line: &str, limit: usize) -> &str {
    let mut end = limit;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoClassifier;

    impl Classifier for EchoClassifier {
        fn classify(&self, _source: &str, line: &str) -> Result<ClassificationVerdict, ClassifierError> {
            Ok(ClassificationVerdict {
                kind: ChangeKind::NewCluster,
                signature: line.to_string(),
                severity: None,
            })
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _source: &str, _line: &str) -> Result<ClassificationVerdict, ClassifierError> {
            Err(ClassifierError("oracle unavailable".to_string()))
        }
    }

    #[test]
    fn test_truncate_policy_cuts_input() {
        let adapter = MiningAdapter::new(Arc::new(EchoClassifier), 5, OversizePolicy::Truncate);
        let verdict = adapter.classify("src", "0123456789").unwrap();
        assert_eq!(verdict.signature, "01234");
    }

    #[test]
    fn test_reject_policy_fails_oversized_input() {
        let adapter = MiningAdapter::new(Arc::new(EchoClassifier), 5, OversizePolicy::Reject);
        let err = adapter.classify("src", "0123456789").unwrap_err();
        assert!(matches!(err, ClassifyError::InputTooLarge { actual: 10, limit: 5 }));
    }

    #[test]
    fn test_within_bound_passes_through() {
        let adapter = MiningAdapter::new(Arc::new(EchoClassifier), 100, OversizePolicy::Reject);
        let verdict = adapter.classify("src", "short").unwrap();
        assert_eq!(verdict.signature, "short");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let adapter = MiningAdapter::new(Arc::new(EchoClassifier), 5, OversizePolicy::Truncate);
        // 'é' is two bytes; cutting at byte 5 would split it
        let verdict = adapter.classify("src", "abcdé rest").unwrap();
        assert_eq!(verdict.signature, "abcd");
    }

    #[test]
    fn test_classifier_failure_propagates() {
        let adapter = MiningAdapter::new(Arc::new(FailingClassifier), 100, OversizePolicy::Truncate);
        let err = adapter.classify("src", "anything").unwrap_err();
        assert!(matches!(err, ClassifyError::Classifier(_)));
    }
}
