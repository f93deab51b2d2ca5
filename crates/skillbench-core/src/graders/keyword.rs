use super::{decode_config, ratio, Grader, GraderOutcome};
use crate::config::ConfigError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
struct KeywordConfig {
    #[serde(default)]
    must_contain: Vec<String>,
    #[serde(default)]
    must_not_contain: Vec<String>,
}

/// Case-insensitive keyword presence/absence checks.
pub struct KeywordGrader {
    name: String,
    must_contain: Vec<String>,
    must_not_contain: Vec<String>,
}

impl KeywordGrader {
    pub fn new(name: impl Into<String>, must_contain: Vec<String>, must_not_contain: Vec<String>) -> Self {
        Self {
            name: name.into(),
            must_contain,
            must_not_contain,
        }
    }

    pub fn from_config(name: &str, config: &Value) -> Result<Arc<dyn Grader>, ConfigError> {
        let cfg: KeywordConfig = decode_config(name, config)?;
        Ok(Arc::new(Self::new(name, cfg.must_contain, cfg.must_not_contain)))
    }
}

impl Grader for KeywordGrader {
    fn grade(&self, output: &str) -> GraderOutcome {
        let haystack = output.to_lowercase();
        let mut failures = Vec::new();

        for keyword in &self.must_contain {
            if !haystack.contains(&keyword.to_lowercase()) {
                failures.push(format!("Missing expected keyword: {keyword}"));
            }
        }
        for keyword in &self.must_not_contain {
            if haystack.contains(&keyword.to_lowercase()) {
                failures.push(format!("Found forbidden keyword: {keyword}"));
            }
        }

        let total = self.must_contain.len() + self.must_not_contain.len();
        let feedback = if failures.is_empty() {
            "All keyword checks passed".to_string()
        } else {
            failures.join("; ")
        };

        GraderOutcome {
            passed: failures.is_empty(),
            score: ratio(total - failures.len(), total),
            feedback,
            details: json!({
                "must_contain": self.must_contain,
                "must_not_contain": self.must_not_contain,
                "failures": failures,
            }),
        }
    }

    fn kind(&self) -> &str {
        "keyword"
    }

    fn name(&self) -> &str {
        &self.name
    }
}
