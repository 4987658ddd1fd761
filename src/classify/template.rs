use super::{ChangeKind, ClassificationVerdict, Classifier, ClassifierError, Severity};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

/// Built-in template miner used by the binary and by tests.
///
/// Masks variable tokens (numbers, hex ids, quoted strings) out of each line
/// and keeps a set of templates already seen per source. The first occurrence
/// of a template is reported as a new cluster when the line carries an error
/// marker, otherwise as a new template; repeats report no change. The real
/// oracle can be substituted through the `Classifier` trait.
pub struct MaskingClassifier {
    mask_hex: Regex,
    mask_num: Regex,
    mask_quoted: Regex,
    seen: Mutex<HashSet<(String, String)>>,
}

impl MaskingClassifier {
    pub fn new() -> Self {
        Self {
            mask_hex: Regex::new(r"\b[0-9a-fA-F]{8,}\b").unwrap(),
            mask_num: Regex::new(r"\d+").unwrap(),
            mask_quoted: Regex::new(r#""[^"]*"|'[^']*'"#).unwrap(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn template_of(&self, line: &str) -> String {
        let masked = self.mask_quoted.replace_all(line, "<str>");
        let masked = self.mask_hex.replace_all(&masked, "<hex>");
        self.mask_num.replace_all(&masked, "<n>").to_string()
    }

    fn severity_of(line: &str) -> Severity {
        let upper = line.to_uppercase();
        if upper.contains("FATAL") || upper.contains("PANIC") || upper.contains("ERROR") {
            Severity::Error
        } else if upper.contains("WARN") {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    fn signature_of(source: &str, template: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"\0");
        hasher.update(template.as_bytes());
        let digest = hasher.finalize();
        digest
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl Default for MaskingClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for MaskingClassifier {
    fn classify(&self, source: &str, line: &str) -> Result<ClassificationVerdict, ClassifierError> {
        let template = self.template_of(line);
        let severity = Self::severity_of(line);

        let first_seen = {
            let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
            seen.insert((source.to_string(), template.clone()))
        };

        if !first_seen {
            return Ok(ClassificationVerdict::none());
        }

        let kind = if severity >= Severity::Warning {
            ChangeKind::NewCluster
        } else {
            ChangeKind::NewTemplate
        };

        Ok(ClassificationVerdict {
            kind,
            signature: Self::signature_of(source, &template),
            severity: Some(severity),
        })
    }
}
