//! Per-task transcripts.
//!
//! When a transcript directory is configured, every finished task verdict is
//! written as one pretty-printed JSON file holding the rendered prompt and
//! each trial's output, error and grader results. Write failures are logged
//! and never fail the run.

use crate::tasks::PreparedTask;
use crate::types::{iso_timestamp_now, TaskVerdict, TrialResult};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_-]").expect("valid regex"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTranscript {
    pub task_id: String,
    pub task_name: String,
    pub model: String,
    /// `passed`, `failed` or `error`.
    pub status: String,
    pub written_at: String,
    pub prompt: String,
    pub score: f64,
    pub trials: Vec<TrialResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskTranscript {
    pub fn new(prepared: &PreparedTask, verdict: &TaskVerdict) -> Self {
        let status = if verdict.is_error() {
            "error"
        } else if verdict.passed {
            "passed"
        } else {
            "failed"
        };
        let error = if verdict.is_error() {
            verdict.trials.iter().find_map(|t| t.error.clone())
        } else {
            None
        };
        Self {
            task_id: verdict.task_id.clone(),
            task_name: verdict.task_name.clone(),
            model: verdict.model.clone(),
            status: status.to_string(),
            written_at: iso_timestamp_now(),
            prompt: prepared.task.render_prompt(),
            score: verdict.score,
            trials: verdict.trials.clone(),
            error,
        }
    }
}

/// Lowercase, spaces to dashes, anything outside `[a-z0-9_-]` dropped.
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace(' ', "-");
    let cleaned = UNSAFE_CHARS.replace_all(&lowered, "");
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptWriter {
    dir: PathBuf,
}

impl TranscriptWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one transcript as `<task>-<model>-<YYYYMMDD-HHMMSS>.json`.
    /// An existing file is never overwritten; a numeric suffix is added.
    pub fn write(&self, prepared: &PreparedTask, verdict: &TaskVerdict) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let transcript = TaskTranscript::new(prepared, verdict);
        let body = serde_json::to_string_pretty(&transcript)?;

        let stem = format!(
            "{}-{}-{}",
            sanitize_name(&verdict.task_id),
            sanitize_name(&verdict.model),
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}-{attempt}.json")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }
}
