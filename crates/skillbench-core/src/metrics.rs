//! Score aggregation and summary statistics.

use crate::config::Aggregation;
use crate::types::{GraderResult, ModelSummary, TaskStats, TaskVerdict, TrialResult};
use std::sync::Arc;

/// Combines per-grader scores into one trial score.
pub trait ScoreAggregator: Send + Sync {
    fn combine(&self, results: &[GraderResult]) -> f64;
    fn name(&self) -> &str;
}

/// Arithmetic mean of grader scores.
#[derive(Debug, Default)]
pub struct MeanScore;

impl ScoreAggregator for MeanScore {
    fn combine(&self, results: &[GraderResult]) -> f64 {
        if results.is_empty() {
            return 1.0;
        }
        results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
    }

    fn name(&self) -> &str {
        "mean"
    }
}

/// Weighted mean; weights at or below zero count as 1.0.
#[derive(Debug, Default)]
pub struct WeightedScore;

impl ScoreAggregator for WeightedScore {
    fn combine(&self, results: &[GraderResult]) -> f64 {
        if results.is_empty() {
            return 1.0;
        }
        let (sum, total_weight) = results.iter().fold((0.0, 0.0), |(s, w), r| {
            let weight = if r.weight <= 0.0 { 1.0 } else { r.weight };
            (s + r.score * weight, w + weight)
        });
        sum / total_weight
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// Lowest grader score.
#[derive(Debug, Default)]
pub struct MinScore;

impl ScoreAggregator for MinScore {
    fn combine(&self, results: &[GraderResult]) -> f64 {
        results
            .iter()
            .map(|r| r.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
            .unwrap_or(1.0)
    }

    fn name(&self) -> &str {
        "min"
    }
}

pub fn aggregator_for(policy: Aggregation) -> Arc<dyn ScoreAggregator> {
    match policy {
        Aggregation::Mean => Arc::new(MeanScore),
        Aggregation::Weighted => Arc::new(WeightedScore),
        Aggregation::Min => Arc::new(MinScore),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub fn task_stats(trials: &[TrialResult]) -> TaskStats {
    if trials.is_empty() {
        return TaskStats::default();
    }
    let passed = trials.iter().filter(|t| t.passed()).count();
    let avg_score = mean(trials.iter().map(|t| t.score));
    let avg_duration_ms = mean(trials.iter().map(|t| t.duration_ms));
    let min_score = trials.iter().map(|t| t.score).fold(f64::INFINITY, f64::min);
    let max_score = trials.iter().map(|t| t.score).fold(f64::NEG_INFINITY, f64::max);

    TaskStats {
        pass_rate: passed as f64 / trials.len() as f64,
        avg_score,
        min_score,
        max_score,
        avg_duration_ms,
    }
}

/// Fold a model's verdicts into its summary. A task counts as an error when
/// none of its trials produced gradable output.
pub fn summarize_model(model: &str, verdicts: &[TaskVerdict], duration_ms: f64) -> ModelSummary {
    let total = verdicts.len();
    let succeeded = verdicts.iter().filter(|v| v.passed).count();
    let errors = verdicts.iter().filter(|v| !v.passed && v.is_error()).count();
    let failed = total - succeeded - errors;
    let aggregate_score = mean(verdicts.iter().map(|v| v.score));
    let (min_score, max_score) = if verdicts.is_empty() {
        (0.0, 0.0)
    } else {
        (
            verdicts.iter().map(|v| v.score).fold(f64::INFINITY, f64::min),
            verdicts.iter().map(|v| v.score).fold(f64::NEG_INFINITY, f64::max),
        )
    };

    ModelSummary {
        model: model.to_string(),
        total,
        succeeded,
        failed,
        errors,
        success_rate: if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        },
        aggregate_score,
        min_score,
        max_score,
        duration_ms,
    }
}
