use super::expr::Expression;
use super::{decode_config, ratio, Grader, GraderOutcome};
use crate::config::ConfigError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
struct CodeConfig {
    #[serde(default)]
    assertions: Vec<String>,
}

/// Evaluates assertion expressions against the output. Every assertion is
/// parsed up front; the score is the fraction that hold.
pub struct CodeGrader {
    name: String,
    assertions: Vec<Expression>,
}

impl CodeGrader {
    pub fn new(name: impl Into<String>, assertions: &[String]) -> Result<Self, ConfigError> {
        let name = name.into();
        let parsed = assertions
            .iter()
            .map(|src| {
                Expression::parse(src).map_err(|e| {
                    ConfigError::Invalid(format!("grader '{name}': assertion `{src}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name,
            assertions: parsed,
        })
    }

    pub fn from_config(name: &str, config: &Value) -> Result<Arc<dyn Grader>, ConfigError> {
        let cfg: CodeConfig = decode_config(name, config)?;
        Ok(Arc::new(Self::new(name, &cfg.assertions)?))
    }
}

impl Grader for CodeGrader {
    fn grade(&self, output: &str) -> GraderOutcome {
        if self.assertions.is_empty() {
            return GraderOutcome {
                passed: true,
                score: 1.0,
                feedback: "No assertions configured".into(),
                details: Value::Null,
            };
        }

        let mut failures = Vec::new();
        let mut errors = Vec::new();
        for assertion in &self.assertions {
            match assertion.holds(output) {
                Ok(true) => {}
                Ok(false) => failures.push(format!("Failed: {}", assertion.source())),
                Err(e) => {
                    failures.push(format!("Failed: {}", assertion.source()));
                    errors.push(format!("{}: {e}", assertion.source()));
                }
            }
        }

        let total = self.assertions.len();
        let feedback = if failures.is_empty() {
            "All assertions passed".to_string()
        } else {
            failures.join("; ")
        };

        GraderOutcome {
            passed: failures.is_empty(),
            score: ratio(total - failures.len(), total),
            feedback,
            details: json!({
                "total": total,
                "failed": failures.len(),
                "errors": errors,
            }),
        }
    }

    fn kind(&self) -> &str {
        "code"
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grader(assertions: &[&str]) -> CodeGrader {
        let owned: Vec<String> = assertions.iter().map(|s| s.to_string()).collect();
        CodeGrader::new("code", &owned).unwrap()
    }

    #[test]
    fn all_assertions_pass() {
        let res = grader(&["len(output) > 0", "'hello' in output.lower()"]).grade("Hello there");
        assert!(res.passed);
        assert_eq!(res.score, 1.0);
        assert_eq!(res.feedback, "All assertions passed");
    }

    #[test]
    fn partial_failure_reports_each_expression() {
        let res = grader(&["len(output) > 100", "'x' in output", "True"]).grade("abc");
        assert!(!res.passed);
        assert!((res.score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(res.feedback, "Failed: len(output) > 100; Failed: 'x' in output");
    }

    #[test]
    fn runtime_type_error_counts_as_failure() {
        let res = grader(&["output > 3"]).grade("abc");
        assert!(!res.passed);
        assert_eq!(res.details["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn empty_assertions_pass() {
        let res = grader(&[]).grade("");
        assert!(res.passed);
        assert_eq!(res.feedback, "No assertions configured");
    }

    #[test]
    fn syntax_error_rejected_at_construction() {
        let err = CodeGrader::new("code", &["len(output) >".to_string()]).err().unwrap();
        assert!(err.to_string().contains("assertion `len(output) >`"));
    }
}
