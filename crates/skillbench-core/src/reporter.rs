//! Progress reporting trait and types for benchmark execution.

use crate::types::{iso_timestamp_now, GraderResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// About to send a prompt to the engine.
    AgentPrompt,
    /// The engine answered, failed, or timed out.
    AgentResponse,
    /// One grader finished.
    GraderResult,
}

/// A single progress event. `details` always carries `task_id`, `model`
/// and `trial_index`, plus event-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub event_type: EventType,
    pub timestamp: String,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub details: Map<String, Value>,
}

fn trial_details(task_id: &str, model: &str, trial_index: u32) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("task_id".into(), json!(task_id));
    details.insert("model".into(), json!(model));
    details.insert("trial_index".into(), json!(trial_index));
    details
}

impl ProgressEvent {
    pub fn agent_prompt(task_id: &str, model: &str, trial_index: u32, prompt: &str) -> Self {
        let mut details = trial_details(task_id, model, trial_index);
        details.insert("prompt".into(), json!(prompt));
        Self {
            event_type: EventType::AgentPrompt,
            timestamp: iso_timestamp_now(),
            duration_ms: 0.0,
            details,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn agent_response(
        task_id: &str,
        model: &str,
        trial_index: u32,
        output: &str,
        tool_calls: u32,
        error: Option<&str>,
        cached: bool,
        duration_ms: f64,
    ) -> Self {
        let mut details = trial_details(task_id, model, trial_index);
        details.insert("output".into(), json!(output));
        details.insert("tool_calls".into(), json!(tool_calls));
        if let Some(error) = error {
            details.insert("error".into(), json!(error));
        }
        details.insert("cached".into(), json!(cached));
        Self {
            event_type: EventType::AgentResponse,
            timestamp: iso_timestamp_now(),
            duration_ms,
            details,
        }
    }

    pub fn grader_result(task_id: &str, model: &str, trial_index: u32, result: &GraderResult) -> Self {
        let mut details = trial_details(task_id, model, trial_index);
        details.insert("grader".into(), json!(result.name));
        details.insert("grader_type".into(), json!(result.kind));
        details.insert("passed".into(), json!(result.passed));
        details.insert("score".into(), json!(result.score));
        details.insert("feedback".into(), json!(result.feedback));
        Self {
            event_type: EventType::GraderResult,
            timestamp: iso_timestamp_now(),
            duration_ms: result.duration_ms,
            details,
        }
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Trait for progress reporters.
///
/// The runner calls `report` synchronously for every trial, in strict
/// order: `AgentPrompt`, then `AgentResponse`, then one `GraderResult` per
/// grader. Implementations are observers only. They must return quickly
/// and cannot influence the run.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// A no-op reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// A simple reporter that prints one line per event to stderr.
#[derive(Debug, Default)]
pub struct PrintReporter;

impl ProgressReporter for PrintReporter {
    fn report(&self, event: &ProgressEvent) {
        let task = event.detail_str("task_id").unwrap_or("?");
        let model = event.detail_str("model").unwrap_or("?");
        let trial = event
            .details
            .get("trial_index")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        match event.event_type {
            EventType::AgentPrompt => {
                eprintln!("[{model}] {task}#{trial} prompt sent");
            }
            EventType::AgentResponse => match event.detail_str("error") {
                Some(error) => eprintln!("[{model}] {task}#{trial} ERROR: {error}"),
                None => {
                    let cached = event
                        .details
                        .get("cached")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    eprintln!(
                        "[{model}] {task}#{trial} response in {:.0}ms{}",
                        event.duration_ms,
                        if cached { " (cached)" } else { "" }
                    );
                }
            },
            EventType::GraderResult => {
                let passed = event
                    .details
                    .get("passed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let score = event
                    .details
                    .get("score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                eprintln!(
                    "[{model}] {task}#{trial} [{}] {} score={score:.2} {}",
                    if passed { "PASS" } else { "FAIL" },
                    event.detail_str("grader").unwrap_or("?"),
                    event.detail_str("feedback").unwrap_or("")
                );
            }
        }
    }
}

/// Collects every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_snake_case() {
        let event = ProgressEvent::agent_prompt("t1", "m", 0, "hi");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "agent_prompt");
        assert_eq!(value["details"]["task_id"], "t1");
        assert_eq!(value["details"]["prompt"], "hi");
    }

    #[test]
    fn response_error_is_optional() {
        let ok = ProgressEvent::agent_response("t", "m", 1, "out", 3, None, false, 5.0);
        assert!(ok.details.get("error").is_none());
        assert_eq!(ok.details["tool_calls"], 3);

        let failed = ProgressEvent::agent_response("t", "m", 1, "", 0, Some("boom"), false, 5.0);
        assert_eq!(failed.detail_str("error"), Some("boom"));
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let recorder = RecordingReporter::new();
        recorder.report(&ProgressEvent::agent_prompt("t", "m", 0, "p"));
        recorder.report(&ProgressEvent::agent_response("t", "m", 0, "o", 0, None, false, 1.0));
        assert_eq!(
            recorder.event_types(),
            vec![EventType::AgentPrompt, EventType::AgentResponse]
        );
    }
}
