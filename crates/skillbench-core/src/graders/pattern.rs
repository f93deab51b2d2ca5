use super::{decode_config, ratio, Grader, GraderOutcome};
use crate::config::ConfigError;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
struct PatternConfig {
    #[serde(default)]
    must_match: Vec<String>,
    #[serde(default)]
    must_not_match: Vec<String>,
}

/// Regular-expression checks; patterns are compiled once at load time.
pub struct PatternGrader {
    name: String,
    must_match: Vec<Regex>,
    must_not_match: Vec<Regex>,
}

fn compile(name: &str, field: &str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                ConfigError::Invalid(format!(
                    "grader '{name}': invalid {field} regex pattern '{p}': {e}"
                ))
            })
        })
        .collect()
}

impl PatternGrader {
    pub fn new(
        name: impl Into<String>,
        must_match: &[String],
        must_not_match: &[String],
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        Ok(Self {
            must_match: compile(&name, "must_match", must_match)?,
            must_not_match: compile(&name, "must_not_match", must_not_match)?,
            name,
        })
    }

    pub fn from_config(name: &str, config: &Value) -> Result<Arc<dyn Grader>, ConfigError> {
        let cfg: PatternConfig = decode_config(name, config)?;
        Ok(Arc::new(Self::new(name, &cfg.must_match, &cfg.must_not_match)?))
    }
}

impl Grader for PatternGrader {
    fn grade(&self, output: &str) -> GraderOutcome {
        let mut failures = Vec::new();

        for re in &self.must_match {
            if !re.is_match(output) {
                failures.push(format!("Missing expected pattern: {}", re.as_str()));
            }
        }
        for re in &self.must_not_match {
            if re.is_match(output) {
                failures.push(format!("Found forbidden pattern: {}", re.as_str()));
            }
        }

        let total = self.must_match.len() + self.must_not_match.len();
        let feedback = if failures.is_empty() {
            "All patterns matched".to_string()
        } else {
            failures.join("; ")
        };

        GraderOutcome {
            passed: failures.is_empty(),
            score: ratio(total - failures.len(), total),
            feedback,
            details: json!({ "failures": failures }),
        }
    }

    fn kind(&self) -> &str {
        "regex"
    }

    fn name(&self) -> &str {
        &self.name
    }
}
