//! Graders: pure scorers turning an agent output into pass/score/feedback.
//!
//! Grader types are resolved through a [`GraderRegistry`] keyed by the
//! `type` tag of a [`GraderSpec`]. Construction happens while the spec is
//! loaded, so an unknown type or a malformed config fails before any engine
//! exists. Extend the set by registering a constructor.

mod code;
pub mod expr;
mod keyword;
mod pattern;

pub use code::CodeGrader;
pub use keyword::KeywordGrader;
pub use pattern::PatternGrader;

use crate::config::{ConfigError, GraderSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a single grader over one output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraderOutcome {
    pub passed: bool,
    pub score: f64,
    pub feedback: String,
    #[serde(default)]
    pub details: Value,
}

/// A pure scorer: no side effects, no network access.
pub trait Grader: Send + Sync {
    fn grade(&self, output: &str) -> GraderOutcome;
    fn kind(&self) -> &str;
    fn name(&self) -> &str;

    /// Non-deterministic graders (model judges, sampling) make cached replays
    /// unsound, so caching is switched off when one is present.
    fn is_deterministic(&self) -> bool {
        true
    }
}

/// A constructed grader together with its weight in score aggregation.
#[derive(Clone)]
pub struct BoundGrader {
    pub grader: Arc<dyn Grader>,
    pub weight: f64,
}

impl std::fmt::Debug for BoundGrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundGrader")
            .field("name", &self.grader.name())
            .field("kind", &self.grader.kind())
            .field("weight", &self.weight)
            .finish()
    }
}

pub type GraderConstructor = fn(&str, &Value) -> Result<Arc<dyn Grader>, ConfigError>;

/// Maps grader type tags to constructors.
#[derive(Clone)]
pub struct GraderRegistry {
    constructors: BTreeMap<String, GraderConstructor>,
}

impl Default for GraderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl GraderRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the `code`, `keyword` and `regex` graders.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("code", CodeGrader::from_config);
        registry.register("keyword", KeywordGrader::from_config);
        registry.register("regex", PatternGrader::from_config);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: GraderConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, spec: &GraderSpec) -> Result<BoundGrader, ConfigError> {
        if spec.name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "grader of type '{}' is missing a name",
                spec.kind
            )));
        }
        let constructor = self.constructors.get(&spec.kind).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown grader type: {} (grader '{}', supported: {})",
                spec.kind,
                spec.name,
                self.kinds().join(", ")
            ))
        })?;
        let grader = constructor(&spec.name, &spec.config)?;
        Ok(BoundGrader {
            grader,
            weight: spec.effective_weight(),
        })
    }
}

/// Build a grader from the builtin registry.
pub fn get_grader(spec: &GraderSpec) -> Result<BoundGrader, ConfigError> {
    GraderRegistry::builtin().build(spec)
}

/// Decode a grader's `config` mapping, treating a missing config as empty.
pub(crate) fn decode_config<T: DeserializeOwned + Default>(
    name: &str,
    config: &Value,
) -> Result<T, ConfigError> {
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone())
        .map_err(|e| ConfigError::Invalid(format!("grader '{name}': invalid config: {e}")))
}

/// Score for `passed` out of `total` checks; an empty check list scores 1.0.
pub(crate) fn ratio(passed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        passed as f64 / total as f64
    }
}
