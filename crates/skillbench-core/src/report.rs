//! Rendering a [`BenchmarkResult`] for humans and machines.

use crate::config::ConfigError;
use crate::error::Result;
use crate::types::{BenchmarkResult, ModelRun, TaskVerdict};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty-printed JSON of the whole result.
    #[default]
    Json,
    /// Markdown suited to a pull-request comment.
    GithubComment,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" | "default" => Ok(OutputFormat::Json),
            "github-comment" => Ok(OutputFormat::GithubComment),
            other => Err(ConfigError::Invalid(format!(
                "unknown output format: {other} (supported: json, github-comment)"
            ))),
        }
    }
}

pub fn render(result: &BenchmarkResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::GithubComment => Ok(render_github_comment(result)),
    }
}

/// Render a single model's slice of a result, used for per-model output files.
pub fn render_model(result: &BenchmarkResult, model: &str, format: OutputFormat) -> Result<String> {
    let single = BenchmarkResult {
        models: result
            .models
            .iter()
            .filter(|m| m.model == model)
            .cloned()
            .collect(),
        ..result.clone()
    };
    render(&single, format)
}

/// `results.json` + `gpt/4o` becomes `results_gpt-4o.json`.
pub fn per_model_output_path(base: &Path, model: &str) -> PathBuf {
    let sanitized: String = model
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' => '-',
            c => c,
        })
        .collect();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}_{sanitized}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{sanitized}"),
    };
    base.with_file_name(file_name)
}

fn format_duration(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{ms:.0}ms")
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        let secs = (ms / 1000.0).round() as u64;
        format!("{}m{}s", secs / 60, secs % 60)
    }
}

fn status_icon(passed: bool) -> &'static str {
    if passed {
        "✅"
    } else {
        "❌"
    }
}

/// Escape a value for a single markdown table cell.
fn table_cell(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

fn grader_names(verdict: &TaskVerdict) -> String {
    let names: Vec<&str> = verdict
        .trials
        .iter()
        .find(|t| !t.grader_results.is_empty())
        .map(|t| t.grader_results.iter().map(|g| g.name.as_str()).collect())
        .unwrap_or_default();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn render_model_section(md: &mut String, run: &ModelRun) {
    let summary = &run.summary;
    let ok = summary.failed == 0 && summary.errors == 0;
    md.push_str(&format!("### Model: {}\n\n", run.model));
    md.push_str(&format!(
        "**Status:** {} | **Score:** {:.2} | **Duration:** {}\n\n",
        if ok { "✅ Passed" } else { "❌ Failed" },
        summary.aggregate_score,
        format_duration(summary.duration_ms)
    ));
    md.push_str(&format!(
        "- **Tasks:** {} total, {} passed, {} failed, {} errors\n",
        summary.total, summary.succeeded, summary.failed, summary.errors
    ));
    md.push_str(&format!(
        "- **Success Rate:** {:.1}%\n",
        summary.success_rate * 100.0
    ));
    md.push_str(&format!(
        "- **Score Range:** {:.2} - {:.2}\n\n",
        summary.min_score, summary.max_score
    ));

    md.push_str("| Task | Score | Status | Graders |\n");
    md.push_str("|------|-------|--------|---------|\n");
    for verdict in &run.verdicts {
        md.push_str(&format!(
            "| {} | {:.2} | {} | {} |\n",
            table_cell(&verdict.task_name),
            verdict.score,
            status_icon(verdict.passed),
            table_cell(&grader_names(verdict))
        ));
    }
    md.push('\n');

    let flaky: Vec<&TaskVerdict> = run
        .verdicts
        .iter()
        .filter(|v| v.stats.pass_rate > 0.0 && v.stats.pass_rate < 1.0)
        .collect();
    if !flaky.is_empty() {
        md.push_str("#### ⚠️ Flaky Tasks\n\n");
        for verdict in flaky {
            md.push_str(&format!(
                "- **{}**: {:.0}% pass rate, score={:.2}\n",
                verdict.task_name,
                verdict.stats.pass_rate * 100.0,
                verdict.stats.avg_score
            ));
        }
        md.push('\n');
    }

    let failed: Vec<&TaskVerdict> = run.verdicts.iter().filter(|v| !v.passed).collect();
    if !failed.is_empty() {
        md.push_str("#### Failed Task Details\n\n");
        for verdict in failed {
            md.push_str(&format!("**{}**\n\n", verdict.task_name));
            let total = verdict.trials.len();
            for trial in verdict.trials.iter().filter(|t| !t.passed()) {
                md.push_str(&format!(
                    "Trial {}/{} ({:?}):\n",
                    trial.trial_index + 1,
                    total,
                    trial.outcome
                ));
                if let Some(error) = &trial.error {
                    md.push_str(&format!("- ❌ {error}\n"));
                }
                for grader in &trial.grader_results {
                    md.push_str(&format!(
                        "- {} **{}** ({:.2}): {}\n",
                        status_icon(grader.passed),
                        grader.name,
                        grader.score,
                        grader.feedback
                    ));
                }
                md.push('\n');
            }
        }
    }
}

fn render_github_comment(result: &BenchmarkResult) -> String {
    let mut md = String::new();
    md.push_str("## 🧪 Skillbench Results\n\n");
    for run in &result.models {
        render_model_section(&mut md, run);
    }
    md.push_str("---\n\n");
    let models: Vec<&str> = result.models.iter().map(|m| m.model.as_str()).collect();
    md.push_str(&format!(
        "**Benchmark:** {} | **Skill:** {} | **Model:** {} | **Duration:** {}\n",
        result.spec.name,
        if result.spec.skill.is_empty() {
            "-"
        } else {
            result.spec.skill.as_str()
        },
        models.join(", "),
        format_duration(result.duration_ms)
    ));
    md
}
