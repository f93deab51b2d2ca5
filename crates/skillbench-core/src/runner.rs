//! Trial and task execution against one engine.
//!
//! A trial renders the task prompt, sends it under a deadline, and grades
//! the output. A task runs its trials in index order and folds them into a
//! [`TaskVerdict`]. Failures of any kind are recorded in the results and
//! never propagate as errors.

use crate::engine::{AgentEngine, EngineRequest};
use crate::graders::BoundGrader;
use crate::metrics::{task_stats, ScoreAggregator};
use crate::reporter::{ProgressEvent, ProgressReporter};
use crate::tasks::PreparedTask;
use crate::types::{GraderResult, TaskVerdict, TrialOutcome, TrialResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Runs graders in order, timing each one.
pub fn grade_output(graders: &[BoundGrader], output: &str) -> Vec<GraderResult> {
    graders
        .iter()
        .map(|bound| {
            let started = Instant::now();
            let outcome = bound.grader.grade(output);
            GraderResult {
                name: bound.grader.name().to_string(),
                kind: bound.grader.kind().to_string(),
                passed: outcome.passed,
                score: outcome.score,
                weight: bound.weight,
                feedback: outcome.feedback,
                duration_ms: elapsed_ms(started),
                details: outcome.details,
            }
        })
        .collect()
}

fn summarize_feedback(results: &[GraderResult]) -> String {
    let failures: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("{}: {}", r.name, r.feedback))
        .collect();
    if failures.is_empty() {
        "All graders passed".to_string()
    } else {
        failures.join("; ")
    }
}

/// Executes single trials for one model.
pub struct TrialRunner {
    engine: Arc<dyn AgentEngine>,
    model: String,
    timeout: Duration,
    aggregator: Arc<dyn ScoreAggregator>,
    reporter: Arc<dyn ProgressReporter>,
    context_dir: Option<PathBuf>,
}

impl TrialRunner {
    pub fn new(
        engine: Arc<dyn AgentEngine>,
        model: impl Into<String>,
        timeout: Duration,
        aggregator: Arc<dyn ScoreAggregator>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            engine,
            model: model.into(),
            timeout,
            aggregator,
            reporter,
            context_dir: None,
        }
    }

    pub fn with_context_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.context_dir = dir;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn run_trial(&self, prepared: &PreparedTask, trial_index: u32) -> TrialResult {
        let task = &prepared.task;
        let prompt = task.render_prompt();
        let request = EngineRequest {
            task_id: task.id.clone(),
            model: self.model.clone(),
            trial_index,
            prompt,
            files: task.inputs.files.clone(),
            context_dir: self.context_dir.clone(),
        };

        self.reporter.report(&ProgressEvent::agent_prompt(
            &task.id,
            &self.model,
            trial_index,
            &request.prompt,
        ));

        let deadline = task
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);
        let started = Instant::now();
        let sent = tokio::time::timeout(deadline, self.engine.send_prompt(&request)).await;
        let engine_ms = elapsed_ms(started);

        let result = match sent {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err((TrialOutcome::EngineError, e.to_string())),
            Err(_) => Err((
                TrialOutcome::TimedOut,
                format!("timed out after {}s", deadline.as_secs_f64()),
            )),
        };

        let event = match &result {
            Ok(response) => ProgressEvent::agent_response(
                &task.id,
                &self.model,
                trial_index,
                &response.output,
                response.tool_calls,
                None,
                response.from_cache,
                engine_ms,
            ),
            Err((_, error)) => ProgressEvent::agent_response(
                &task.id,
                &self.model,
                trial_index,
                "",
                0,
                Some(error.as_str()),
                false,
                engine_ms,
            ),
        };
        self.reporter.report(&event);

        let response = match result {
            Ok(response) => response,
            Err((outcome, error)) => {
                debug!(task = %task.id, trial = trial_index, ?outcome, "trial failed: {error}");
                return TrialResult {
                    task_id: task.id.clone(),
                    model: self.model.clone(),
                    trial_index,
                    output: String::new(),
                    tool_calls: 0,
                    outcome,
                    score: 0.0,
                    feedback: error.clone(),
                    error: Some(error),
                    grader_results: Vec::new(),
                    duration_ms: elapsed_ms(started),
                    cached: false,
                };
            }
        };

        let grader_results = grade_output(&prepared.graders, &response.output);
        for result in &grader_results {
            self.reporter.report(&ProgressEvent::grader_result(
                &task.id,
                &self.model,
                trial_index,
                result,
            ));
        }

        let passed = grader_results.iter().all(|r| r.passed);
        let score = self.aggregator.combine(&grader_results);
        debug!(
            task = %task.id,
            trial = trial_index,
            passed,
            score,
            cached = response.from_cache,
            "trial graded"
        );

        TrialResult {
            task_id: task.id.clone(),
            model: self.model.clone(),
            trial_index,
            output: response.output,
            tool_calls: response.tool_calls,
            outcome: if passed {
                TrialOutcome::Passed
            } else {
                TrialOutcome::GradingFailed
            },
            score,
            feedback: summarize_feedback(&grader_results),
            error: None,
            grader_results,
            duration_ms: elapsed_ms(started),
            cached: response.from_cache,
        }
    }
}

/// Runs every trial of a task and folds them into a verdict.
pub struct TaskRunner {
    trials: TrialRunner,
    trials_per_task: u32,
}

impl TaskRunner {
    pub fn new(trials: TrialRunner, trials_per_task: u32) -> Self {
        Self {
            trials,
            trials_per_task,
        }
    }

    pub async fn run_task(&self, prepared: &PreparedTask) -> TaskVerdict {
        let mut results = Vec::with_capacity(self.trials_per_task as usize);
        for trial_index in 0..self.trials_per_task {
            results.push(self.trials.run_trial(prepared, trial_index).await);
        }

        let stats = task_stats(&results);
        let passed = !results.is_empty() && results.iter().all(TrialResult::passed);
        TaskVerdict {
            task_id: prepared.task.id.clone(),
            task_name: prepared.task.display_name().to_string(),
            model: self.trials.model().to_string(),
            trials: results,
            passed,
            score: stats.avg_score,
            stats,
        }
    }
}
