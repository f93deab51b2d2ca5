//! CLI for skillbench - a benchmark harness for agent skills.

mod formatting;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::Term;
use progress::ProgressDisplay;
use skillbench_core::cache::FsCache;
use skillbench_core::error::EXIT_ERROR;
use skillbench_core::reporter::{NullReporter, PrintReporter, ProgressReporter};
use skillbench_core::{Benchmark, SkillbenchError, SpecOverrides, TaskFilter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "skillbench",
    version,
    about = "Benchmark harness for evaluating agent skills"
)]
struct Cli {
    /// Show per-trial progress events and info-level logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a benchmark spec.
    Run {
        /// Path to the benchmark spec file.
        spec: PathBuf,
        /// Model to evaluate; repeat for several models.
        #[arg(long = "model")]
        models: Vec<String>,
        /// Output format: json or github-comment.
        #[arg(long, default_value = "json")]
        format: String,
        /// Reuse recorded engine responses across runs.
        #[arg(long)]
        cache: bool,
        #[arg(long, env = "SKILLBENCH_CACHE_DIR", default_value = ".skillbench-cache")]
        cache_dir: PathBuf,
        /// Output file path (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory that task fixture files are resolved against
        /// (default: ./fixtures relative to the spec).
        #[arg(long)]
        context_dir: Option<PathBuf>,
        /// Only run tasks whose id or name matches a glob; repeatable or
        /// comma-separated.
        #[arg(long = "task", value_delimiter = ',')]
        task_patterns: Vec<String>,
        /// Only run tasks carrying a tag that matches a glob.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Write one JSON transcript per task into this directory.
        #[arg(long)]
        transcript_dir: Option<PathBuf>,
        /// Override trials per task.
        #[arg(long)]
        trials: Option<u32>,
        /// Override the per-trial timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Override the executor.
        #[arg(long)]
        executor: Option<String>,
    },

    /// Manage the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Load a spec, build its graders and check the executor without running.
    Validate {
        /// Path to the benchmark spec file.
        spec: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Remove every cached response.
    Clear {
        #[arg(long, env = "SKILLBENCH_CACHE_DIR", default_value = ".skillbench-cache")]
        cache_dir: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<SkillbenchError>()
                .map(SkillbenchError::exit_code)
                .unwrap_or(EXIT_ERROR);
            eprintln!("error: {err}");
            ExitCode::from(code as u8)
        }
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            spec,
            models,
            format,
            cache,
            cache_dir,
            output,
            context_dir,
            task_patterns,
            tags,
            transcript_dir,
            trials,
            timeout,
            executor,
        } => {
            let overrides = SpecOverrides {
                trials_per_task: trials,
                timeout_seconds: timeout,
                executor,
            };
            let mut bench = Benchmark::load(&spec, overrides)?;
            if let Some(dir) = context_dir {
                bench = bench.with_context_dir(dir);
            }
            let filter = TaskFilter::new(&task_patterns, &tags).map_err(SkillbenchError::from)?;
            bench = bench.with_task_filter(filter);
            if let Some(dir) = transcript_dir {
                bench = bench.with_transcript_dir(dir);
            }
            if cache {
                bench = bench.with_cache(Arc::new(FsCache::new(&cache_dir)));
            }
            if let Some(path) = &output {
                bench = bench.with_output(path);
            }

            let mut display = None;
            let reporter: Arc<dyn ProgressReporter> = if cli.verbose {
                Arc::new(PrintReporter)
            } else if Term::stderr().is_term() {
                let shown = if models.is_empty() {
                    vec![bench.spec().config.model.clone()]
                } else {
                    models.clone()
                };
                let selected = bench.selected_tasks().map(|t| t.len()).unwrap_or(0);
                let per_model =
                    selected as u64 * u64::from(bench.spec().config.trials_per_task);
                let progress = Arc::new(ProgressDisplay::new(&shown, per_model));
                display = Some(progress.clone());
                progress
            } else {
                Arc::new(NullReporter)
            };
            let bench = bench.with_reporter(reporter);

            let rt = tokio::runtime::Runtime::new()?;
            let report = rt.block_on(bench.run(&models, &format));
            if let Some(display) = &display {
                display.finish();
            }
            let report = report?;

            formatting::print_run_summary(&report.result);
            if report.written.is_empty() {
                println!("{}", report.rendered);
            } else {
                for path in &report.written {
                    eprintln!("Results saved to: {}", path.display());
                }
            }
            report.check()?;
        }
        Command::Cache {
            action: CacheCommand::Clear { cache_dir },
        } => {
            FsCache::new(&cache_dir)
                .clear()
                .map_err(SkillbenchError::from)?;
            println!("Cleared cache at {}", cache_dir.display());
        }
        Command::Validate { spec } => {
            let bench = Benchmark::load(&spec, SpecOverrides::default())?;
            bench.validate()?;
            formatting::print_spec_summary(bench.spec(), bench.tasks());
            println!("{} is valid", spec.display());
        }
    }
    Ok(())
}
