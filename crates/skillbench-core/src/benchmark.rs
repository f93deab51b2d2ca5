//! Benchmark - the main entry point for running benchmarks.

use crate::cache::{Cache, NullCache};
use crate::config::{load_spec_with_overrides, BenchmarkSpec, ConfigError, SpecOverrides};
use crate::engine::EngineRegistry;
use crate::error::{Result, SkillbenchError};
use crate::graders::GraderRegistry;
use crate::orchestrator::Orchestrator;
use crate::report::{per_model_output_path, render, render_model, OutputFormat};
use crate::reporter::{NullReporter, ProgressReporter};
use crate::tasks::{load_tasks, PreparedTask, TaskFilter};
use crate::types::BenchmarkResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Outcome of a completed run, already rendered.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub result: BenchmarkResult,
    pub format: OutputFormat,
    pub rendered: String,
    /// Files written, in order: the main output, then one per model.
    pub written: Vec<PathBuf>,
}

impl BenchmarkReport {
    pub fn check(&self) -> std::result::Result<(), SkillbenchError> {
        self.result.check()
    }
}

/// The main benchmark runner.
pub struct Benchmark {
    spec: BenchmarkSpec,
    spec_path: PathBuf,
    tasks: Vec<PreparedTask>,
    engines: EngineRegistry,
    reporter: Arc<dyn ProgressReporter>,
    cache: Arc<dyn Cache>,
    context_dir: PathBuf,
    output: Option<PathBuf>,
    filter: TaskFilter,
    transcript_dir: Option<PathBuf>,
}

impl Benchmark {
    /// Load a spec and its tasks with the built-in graders.
    pub fn load(spec_path: impl AsRef<Path>, overrides: SpecOverrides) -> Result<Self> {
        Self::load_with_graders(spec_path, overrides, &GraderRegistry::builtin())
    }

    pub fn load_with_graders(
        spec_path: impl AsRef<Path>,
        overrides: SpecOverrides,
        graders: &GraderRegistry,
    ) -> Result<Self> {
        let spec_path = spec_path.as_ref().to_path_buf();
        let spec = load_spec_with_overrides(&spec_path, overrides)?;
        let base_dir = spec_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let tasks = load_tasks(&spec, &base_dir, graders)?;
        info!(spec = %spec.name, tasks = tasks.len(), "loaded benchmark");

        Ok(Self {
            spec,
            spec_path,
            tasks,
            engines: EngineRegistry::builtin(),
            reporter: Arc::new(NullReporter),
            cache: Arc::new(NullCache),
            context_dir: base_dir.join("fixtures"),
            output: None,
            filter: TaskFilter::default(),
            transcript_dir: None,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_engine_registry(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    /// Override the fixture directory (defaults to `fixtures/` next to the
    /// spec).
    pub fn with_context_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.context_dir = dir.into();
        self
    }

    /// Write the rendered result to `path` after the run.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_task_filter(mut self, filter: TaskFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Write per-task JSON transcripts into `dir`.
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = Some(dir.into());
        self
    }

    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    pub fn spec(&self) -> &BenchmarkSpec {
        &self.spec
    }

    pub fn spec_path(&self) -> &Path {
        &self.spec_path
    }

    pub fn tasks(&self) -> &[PreparedTask] {
        &self.tasks
    }

    /// Tasks that survive the configured filter, in run order.
    pub fn selected_tasks(&self) -> std::result::Result<Vec<PreparedTask>, ConfigError> {
        self.filter.apply(&self.tasks)
    }

    /// Check that the configured executor exists without constructing it.
    pub fn validate(&self) -> Result<()> {
        self.engines.resolve(&self.spec.config.executor)?;
        Ok(())
    }

    /// Run every model, then render in `format` and write any output files.
    ///
    /// The format is parsed only after the run finishes, so every engine has
    /// already been shut down when an unknown format is reported. Failing
    /// verdicts are left for [`BenchmarkReport::check`].
    pub async fn run(&self, models: &[String], format: &str) -> Result<BenchmarkReport> {
        if let Some(path) = &self.output {
            check_per_model_paths(path, models)?;
        }
        let mut orchestrator = Orchestrator::new(self.spec.clone(), self.tasks.clone())
            .with_engine_registry(self.engines.clone())
            .with_reporter(self.reporter.clone())
            .with_cache(self.cache.clone())
            .with_context_dir(self.context_dir.clone())
            .with_task_filter(self.filter.clone());
        if let Some(dir) = &self.transcript_dir {
            orchestrator = orchestrator.with_transcript_dir(dir.clone());
        }
        let result = orchestrator.run(models).await?;

        let format: OutputFormat = format.parse()?;
        let rendered = render(&result, format)?;

        let mut written = Vec::new();
        if let Some(path) = &self.output {
            write_output(path, &rendered)?;
            written.push(path.clone());
            if result.models.len() > 1 {
                for run in &result.models {
                    let model_path = per_model_output_path(path, &run.model);
                    write_output(&model_path, &render_model(&result, &run.model, format)?)?;
                    written.push(model_path);
                }
            }
        }

        Ok(BenchmarkReport {
            result,
            format,
            rendered,
            written,
        })
    }
}

/// Distinct models must never share a per-model output file.
fn check_per_model_paths(output: &Path, models: &[String]) -> Result<()> {
    if models.len() < 2 {
        return Ok(());
    }
    let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
    for model in models.iter().map(String::as_str) {
        let path = per_model_output_path(output, model);
        if let Some(other) = claimed.insert(path.clone(), model) {
            if other != model {
                return Err(ConfigError::Invalid(format!(
                    "models '{other}' and '{model}' map to the same output file {}",
                    path.display()
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)?;
    info!(path = %path.display(), "wrote results");
    Ok(())
}
