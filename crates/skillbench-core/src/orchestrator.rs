//! Sequential orchestration: one engine per model, tasks in id order.

use crate::cache::{Cache, NullCache};
use crate::config::{BenchmarkSpec, ConfigError};
use crate::engine::{
    AgentEngine, CachedEngine, EngineFactory, EngineGuard, EngineRegistry, EngineSettings,
};
use crate::error::Result;
use crate::metrics::{aggregator_for, summarize_model};
use crate::reporter::{NullReporter, ProgressReporter};
use crate::runner::{TaskRunner, TrialRunner};
use crate::tasks::{PreparedTask, TaskFilter};
use crate::transcript::TranscriptWriter;
use crate::types::{iso_timestamp_now, BenchmarkResult, ModelRun, SpecInfo};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct Orchestrator {
    spec: BenchmarkSpec,
    tasks: Vec<PreparedTask>,
    engines: EngineRegistry,
    reporter: Arc<dyn ProgressReporter>,
    cache: Arc<dyn Cache>,
    context_dir: Option<PathBuf>,
    filter: TaskFilter,
    transcripts: Option<TranscriptWriter>,
}

impl Orchestrator {
    pub fn new(spec: BenchmarkSpec, mut tasks: Vec<PreparedTask>) -> Self {
        tasks.sort_by(|a, b| a.task.id.cmp(&b.task.id));
        Self {
            spec,
            tasks,
            engines: EngineRegistry::builtin(),
            reporter: Arc::new(NullReporter),
            cache: Arc::new(NullCache),
            context_dir: None,
            filter: TaskFilter::default(),
            transcripts: None,
        }
    }

    /// Set a custom progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Enable response caching through `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_engine_registry(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    /// Directory that task fixture files are resolved against.
    pub fn with_context_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.context_dir = Some(dir.into());
        self
    }

    /// Restrict the run to tasks matching `filter`.
    pub fn with_task_filter(mut self, filter: TaskFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Write one JSON transcript per task verdict into `dir`.
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcripts = Some(TranscriptWriter::new(dir));
        self
    }

    pub fn spec(&self) -> &BenchmarkSpec {
        &self.spec
    }

    pub fn tasks(&self) -> &[PreparedTask] {
        &self.tasks
    }

    /// Requested models in declared order, or the spec's default model.
    pub fn resolve_models(
        &self,
        requested: &[String],
    ) -> std::result::Result<Vec<String>, ConfigError> {
        if requested.is_empty() {
            return Ok(vec![self.spec.config.model.clone()]);
        }
        let mut seen = HashSet::new();
        for model in requested {
            if model.trim().is_empty() {
                return Err(ConfigError::Invalid("model name must not be empty".into()));
            }
            if !seen.insert(model.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate model: {model}")));
            }
        }
        Ok(requested.to_vec())
    }

    fn caching_enabled(&self, tasks: &[PreparedTask]) -> bool {
        if !self.cache.is_enabled() {
            return false;
        }
        if let Some(task) = tasks.iter().find(|t| !t.is_deterministic()) {
            warn!(
                task = %task.task.id,
                "non-deterministic grader present; caching disabled for this run"
            );
            return false;
        }
        true
    }

    /// Run every task against every model.
    ///
    /// Configuration problems (unknown executor, duplicate models, filters
    /// that match nothing, engine construction failures) are returned as errors before or instead of
    /// running. Failing verdicts are not errors here; see
    /// [`BenchmarkResult::check`].
    pub async fn run(&self, models: &[String]) -> Result<BenchmarkResult> {
        let models = self.resolve_models(models)?;
        let tasks = self.filter.apply(&self.tasks)?;
        let factory = self.engines.resolve(&self.spec.config.executor)?;
        let caching = self.caching_enabled(&tasks);

        let started_at = iso_timestamp_now();
        let started = Instant::now();
        info!(
            spec = %self.spec.name,
            executor = %self.spec.config.executor,
            models = models.len(),
            tasks = tasks.len(),
            "starting benchmark"
        );

        let mut runs = Vec::with_capacity(models.len());
        for model in &models {
            runs.push(self.run_model(&factory, &tasks, model, caching).await?);
        }

        Ok(BenchmarkResult {
            spec: SpecInfo {
                name: self.spec.name.clone(),
                skill: self.spec.skill.clone(),
                version: self.spec.version.clone(),
                executor: self.spec.config.executor.clone(),
            },
            models: runs,
            started_at,
            finished_at: iso_timestamp_now(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    async fn run_model(
        &self,
        factory: &EngineFactory,
        tasks: &[PreparedTask],
        model: &str,
        caching: bool,
    ) -> Result<ModelRun> {
        let config = &self.spec.config;
        let started = Instant::now();
        info!(model, "starting model");

        let settings = EngineSettings::from_config(config, model, self.context_dir.clone());
        let mut engine = factory.as_ref()(&settings)?;
        if caching {
            let cached: Arc<dyn AgentEngine> =
                Arc::new(CachedEngine::new(engine, self.cache.clone()));
            engine = cached;
        }

        let grace = Duration::try_from_secs_f64(config.shutdown_grace_seconds)
            .unwrap_or(Duration::MAX);
        let guard = EngineGuard::new(engine, grace);

        let trials = TrialRunner::new(
            guard.engine().clone(),
            model,
            Duration::from_secs(config.timeout_seconds),
            aggregator_for(config.aggregation),
            self.reporter.clone(),
        )
        .with_context_dir(self.context_dir.clone());
        let runner = TaskRunner::new(trials, config.trials_per_task);

        let mut verdicts = Vec::with_capacity(tasks.len());
        for task in tasks {
            let verdict = runner.run_task(task).await;
            if let Some(writer) = &self.transcripts {
                if let Err(e) = writer.write(task, &verdict) {
                    warn!(
                        task = %task.task.id,
                        dir = %writer.dir().display(),
                        error = %e,
                        "failed to write transcript"
                    );
                }
            }
            verdicts.push(verdict);
        }
        guard.release().await;

        let summary = summarize_model(model, &verdicts, started.elapsed().as_secs_f64() * 1000.0);
        info!(
            model,
            succeeded = summary.succeeded,
            failed = summary.failed,
            errors = summary.errors,
            score = summary.aggregate_score,
            "model finished"
        );
        Ok(ModelRun {
            model: model.to_string(),
            summary,
            verdicts,
        })
    }
}
