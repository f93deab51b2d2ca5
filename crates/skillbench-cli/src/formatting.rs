//! Terminal summaries for the `run` and `validate` commands.
//!
//! Everything here prints to stderr; stdout is reserved for rendered results.

use console::style;
use skillbench_core::tasks::PreparedTask;
use skillbench_core::types::{BenchmarkResult, ModelRun};
use skillbench_core::BenchmarkSpec;

pub fn print_spec_summary(spec: &BenchmarkSpec, tasks: &[PreparedTask]) {
    eprintln!(
        "{} {} (skill: {}, version {})",
        style("Benchmark").bold(),
        style(&spec.name).cyan(),
        if spec.skill.is_empty() { "-" } else { spec.skill.as_str() },
        spec.version
    );
    eprintln!(
        "  executor {} | model {} | {} trial(s) per task | timeout {}s | {:?} scoring",
        spec.config.executor,
        spec.config.model,
        spec.config.trials_per_task,
        spec.config.timeout_seconds,
        spec.config.aggregation
    );
    eprintln!("  {} task(s):", tasks.len());
    for prepared in tasks {
        let graders: Vec<String> = prepared
            .graders
            .iter()
            .map(|g| format!("{}:{}", g.grader.kind(), g.grader.name()))
            .collect();
        eprintln!(
            "    {:<24} {}",
            prepared.task.id,
            style(if graders.is_empty() {
                "(no graders)".to_string()
            } else {
                graders.join(", ")
            })
            .dim()
        );
    }
}

fn print_model_run(run: &ModelRun) {
    let s = &run.summary;
    let status = if s.failed == 0 && s.errors == 0 {
        style("PASSED").green().bold()
    } else {
        style("FAILED").red().bold()
    };
    eprintln!("{} {} {}", style("→").cyan().bold(), style(&run.model).bold(), status);
    eprintln!(
        "  {} {}/{} ({:.1}%)  {} {}  {} {}",
        style("Passed:").dim(),
        style(s.succeeded).green(),
        s.total,
        s.success_rate * 100.0,
        style("Failed:").dim(),
        style(s.failed).red(),
        style("Errors:").dim(),
        style(s.errors).yellow()
    );
    eprintln!(
        "  {} {:.2} (min {:.2}, max {:.2})  {} {:.1}s",
        style("Score:").dim(),
        s.aggregate_score,
        s.min_score,
        s.max_score,
        style("Duration:").dim(),
        s.duration_ms / 1000.0
    );
    for verdict in run.verdicts.iter().filter(|v| !v.passed) {
        let reason = verdict
            .trials
            .iter()
            .find(|t| !t.passed())
            .map(|t| t.feedback.as_str())
            .unwrap_or("");
        eprintln!("    {} {}: {}", style("✗").red(), verdict.task_id, reason);
    }
}

pub fn print_run_summary(result: &BenchmarkResult) {
    eprintln!();
    for run in &result.models {
        print_model_run(run);
    }
    eprintln!();
}
