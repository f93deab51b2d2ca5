//! Benchmark spec loading and validation.
//!
//! A spec is loaded via figment from multiple layers:
//! 1. YAML file (with `${VAR}` / `${VAR:-default}` interpolation)
//! 2. Environment variables (SKILLBENCH_ prefix, __ as nested separator)
//! 3. CLI overrides (passed programmatically)

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Figment(#[from] figment::Error),
    #[error("failed to parse task file {path}: {source}")]
    Task {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// DEFAULTS (all in one place)
// ============================================================================

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_trials_per_task() -> u32 {
    1
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_executor() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_shutdown_grace_seconds() -> f64 {
    5.0
}

fn default_weight() -> f64 {
    1.0
}

// ============================================================================
// SCORE AGGREGATION
// ============================================================================

/// How grader scores combine into a trial score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Weighted,
    Min,
}

// ============================================================================
// RUN CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_trials_per_task")]
    pub trials_per_task: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_executor")]
    pub executor: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: f64,
    /// Agent command for the `command` executor.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trials_per_task: default_trials_per_task(),
            timeout_seconds: default_timeout_seconds(),
            executor: default_executor(),
            model: default_model(),
            aggregation: Aggregation::default(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            command: None,
            env: BTreeMap::new(),
        }
    }
}

// ============================================================================
// GRADER SPEC
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraderSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl GraderSpec {
    /// Weights at or below zero count as 1.0.
    pub fn effective_weight(&self) -> f64 {
        if self.weight <= 0.0 {
            1.0
        } else {
            self.weight
        }
    }
}

// ============================================================================
// BENCHMARK SPEC
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub name: String,
    #[serde(default)]
    pub skill: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: RunConfig,
    /// Graders applied to every task, ahead of the task's own graders.
    #[serde(default)]
    pub graders: Vec<GraderSpec>,
    #[serde(default)]
    pub tasks: Vec<String>,
}

// ============================================================================
// CLI OVERRIDES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trials_per_task: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
}

impl SpecOverrides {
    fn is_empty(&self) -> bool {
        self.trials_per_task.is_none() && self.timeout_seconds.is_none() && self.executor.is_none()
    }
}

// ============================================================================
// LOADING
// ============================================================================

pub fn load_spec(path: impl AsRef<Path>) -> Result<BenchmarkSpec, ConfigError> {
    load_spec_with_overrides(path, SpecOverrides::default())
}

pub fn load_spec_with_overrides(
    path: impl AsRef<Path>,
    overrides: SpecOverrides,
) -> Result<BenchmarkSpec, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let interpolated = interpolate_env_vars(&contents);

    let mut figment = Figment::new()
        .merge(Yaml::string(&interpolated))
        .merge(Env::prefixed("SKILLBENCH_").split("__"));

    if !overrides.is_empty() {
        #[derive(Serialize)]
        struct ConfigOverride {
            config: SpecOverrides,
        }

        figment = figment.merge(Serialized::defaults(ConfigOverride { config: overrides }));
    }

    let spec: BenchmarkSpec = figment.extract()?;
    validate_spec(&spec)?;
    Ok(spec)
}

pub fn interpolate_env_vars(input: &str) -> String {
    use once_cell::sync::Lazy;
    use regex::Regex;
    use std::env;

    static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
    });

    ENV_VAR_RE
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_val = caps.get(2).map(|m| m.as_str());
            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_val.unwrap_or("").to_string(),
            }
        })
        .to_string()
}

pub fn validate_spec(spec: &BenchmarkSpec) -> Result<(), ConfigError> {
    if spec.name.trim().is_empty() {
        return Err(ConfigError::Invalid("spec name must not be empty".into()));
    }
    if spec.config.trials_per_task < 1 {
        return Err(ConfigError::Invalid(format!(
            "trials_per_task must be at least 1, got {}",
            spec.config.trials_per_task
        )));
    }
    if spec.config.timeout_seconds < 1 {
        return Err(ConfigError::Invalid(format!(
            "timeout_seconds must be at least 1, got {}",
            spec.config.timeout_seconds
        )));
    }
    if spec.config.executor.trim().is_empty() {
        return Err(ConfigError::Invalid("executor must not be empty".into()));
    }
    let grace = spec.config.shutdown_grace_seconds;
    if grace.is_nan() || grace <= 0.0 {
        return Err(ConfigError::Invalid(
            "shutdown_grace_seconds must be positive".into(),
        ));
    }
    if spec.tasks.is_empty() {
        return Err(ConfigError::Invalid(
            "at least one task pattern is required".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_with_default() {
        std::env::remove_var("SKILLBENCH_UNSET_VAR");
        let output = interpolate_env_vars("model: ${SKILLBENCH_UNSET_VAR:-gpt-4o}");
        assert_eq!(output, "model: gpt-4o");
    }

    #[test]
    fn test_effective_weight() {
        let mut spec = GraderSpec {
            name: "g".into(),
            kind: "keyword".into(),
            weight: 0.0,
            config: serde_json::Value::Null,
        };
        assert_eq!(spec.effective_weight(), 1.0);
        spec.weight = 2.5;
        assert_eq!(spec.effective_weight(), 2.5);
    }

    #[test]
    fn test_overrides_empty() {
        assert!(SpecOverrides::default().is_empty());
        let overrides = SpecOverrides {
            trials_per_task: Some(3),
            ..Default::default()
        };
        assert!(!overrides.is_empty());
    }
}
