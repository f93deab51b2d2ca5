//! Shared result types for skillbench.

use crate::error::SkillbenchError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn iso_timestamp_now() -> String {
    Utc::now().to_rfc3339()
}

/// How a single trial ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    #[default]
    Passed,
    GradingFailed,
    EngineError,
    TimedOut,
}

impl TrialOutcome {
    pub fn is_passed(self) -> bool {
        self == TrialOutcome::Passed
    }

    /// Engine errors and timeouts: the output never reached the graders.
    pub fn is_execution_error(self) -> bool {
        matches!(self, TrialOutcome::EngineError | TrialOutcome::TimedOut)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraderResult {
    pub name: String,
    pub kind: String,
    pub passed: bool,
    pub score: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialResult {
    pub task_id: String,
    pub model: String,
    pub trial_index: u32,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub tool_calls: u32,
    pub outcome: TrialOutcome,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub grader_results: Vec<GraderResult>,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub cached: bool,
}

impl TrialResult {
    pub fn passed(&self) -> bool {
        self.outcome.is_passed()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskStats {
    pub pass_rate: f64,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskVerdict {
    pub task_id: String,
    #[serde(default)]
    pub task_name: String,
    pub model: String,
    pub trials: Vec<TrialResult>,
    /// True iff every trial passed.
    pub passed: bool,
    pub score: f64,
    #[serde(default)]
    pub stats: TaskStats,
}

impl TaskVerdict {
    /// Every trial failed to execute (engine error or timeout).
    pub fn is_error(&self) -> bool {
        !self.trials.is_empty() && self.trials.iter().all(|t| t.outcome.is_execution_error())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelSummary {
    pub model: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: usize,
    pub success_rate: f64,
    pub aggregate_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRun {
    pub model: String,
    pub summary: ModelSummary,
    pub verdicts: Vec<TaskVerdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecInfo {
    pub name: String,
    pub skill: String,
    pub version: String,
    pub executor: String,
}

/// Overall classification of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    TestsFailed { failed: usize, errors: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkResult {
    pub spec: SpecInfo,
    pub models: Vec<ModelRun>,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: f64,
}

impl BenchmarkResult {
    pub fn status(&self) -> RunStatus {
        let (failed, errors) = self
            .models
            .iter()
            .fold((0, 0), |(f, e), m| (f + m.summary.failed, e + m.summary.errors));
        if failed == 0 && errors == 0 {
            RunStatus::Passed
        } else {
            RunStatus::TestsFailed { failed, errors }
        }
    }

    /// Turn a run with failing verdicts into [`SkillbenchError::TestFailure`].
    pub fn check(&self) -> Result<(), SkillbenchError> {
        match self.status() {
            RunStatus::Passed => Ok(()),
            RunStatus::TestsFailed { failed, errors } => {
                Err(SkillbenchError::TestFailure { failed, errors })
            }
        }
    }

    pub fn model(&self, name: &str) -> Option<&ModelRun> {
        self.models.iter().find(|m| m.model == name)
    }
}
