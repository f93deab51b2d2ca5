//! Integration tests for the skillbench-core Benchmark and Orchestrator APIs.

use async_trait::async_trait;
use skillbench_core::cache::MemoryCache;
use skillbench_core::config::ConfigError;
use skillbench_core::engine::{
    AgentEngine, EngineError, EngineRegistry, EngineRequest, EngineResponse, EngineSettings,
};
use skillbench_core::error::EXIT_TESTS_FAILED;
use skillbench_core::graders::{Grader, GraderOutcome, GraderRegistry};
use skillbench_core::reporter::{EventType, RecordingReporter};
use skillbench_core::{Benchmark, SkillbenchError, SpecOverrides, TaskFilter, TrialOutcome};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    prompts: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl Counters {
    fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
    fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Echo,
    Fail,
    Sleep(Duration),
}

struct CountingEngine {
    counters: Arc<Counters>,
    behavior: Behavior,
    model: String,
}

#[async_trait]
impl AgentEngine for CountingEngine {
    async fn send_prompt(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        self.counters.prompts.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Echo => Ok(EngineResponse::new(format!(
                "[{}] {}",
                self.model, request.prompt
            ))),
            Behavior::Fail => Err(EngineError::Failed("backend unavailable".into())),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(EngineResponse::new("late"))
            }
        }
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("counting:{}", self.model)
    }
}

fn counting_registry(counters: Arc<Counters>, behavior: Behavior) -> EngineRegistry {
    let mut registry = EngineRegistry::builtin();
    registry.register("counting", move |settings: &EngineSettings| {
        counters.built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingEngine {
            counters: counters.clone(),
            behavior,
            model: settings.model.clone(),
        }) as Arc<dyn AgentEngine>)
    });
    registry
}

fn broken_registry(counters: Arc<Counters>) -> EngineRegistry {
    let mut registry = EngineRegistry::empty();
    registry.register("counting", move |_settings: &EngineSettings| {
        counters.built.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::Unavailable("no credentials".into()))
    });
    registry
}

fn write_spec(dir: &Path, executor: &str, trials: u32, extra: &str) -> PathBuf {
    let spec_path = dir.join("bench.yaml");
    fs::write(
        &spec_path,
        format!(
            r#"
name: explain-bench
skill: code-explainer
config:
  trials_per_task: {trials}
  timeout_seconds: 1
  executor: {executor}
  model: default-model
tasks:
  - "tasks/*.yaml"
{extra}
"#
        ),
    )
    .unwrap();
    spec_path
}

fn write_task(dir: &Path, id: &str, prompt: &str, must_contain: &str) {
    let tasks = dir.join("tasks");
    fs::create_dir_all(&tasks).unwrap();
    fs::write(
        tasks.join(format!("{id}.yaml")),
        format!(
            r#"
id: {id}
name: Task {id}
inputs:
  prompt: "{prompt}"
graders:
  - name: mentions
    type: keyword
    config:
      must_contain: ["{must_contain}"]
"#
        ),
    )
    .unwrap();
}

fn models(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn mock_run_passes_with_indexed_trials() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "mock", 3, "");
    write_task(dir.path(), "beta", "Explain recursion", "recursion");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let bench = Benchmark::load(&spec, SpecOverrides::default()).unwrap();
    let report = bench.run(&[], "json").await.unwrap();
    let result = &report.result;

    assert_eq!(result.models.len(), 1);
    let run = &result.models[0];
    assert_eq!(run.model, "default-model");

    let ids: Vec<&str> = run.verdicts.iter().map(|v| v.task_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "beta"]);
    for verdict in &run.verdicts {
        let indices: Vec<u32> = verdict.trials.iter().map(|t| t.trial_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(verdict.passed);
        assert!(verdict.trials[0].output.starts_with("Mock response for: "));
    }
    assert_eq!(run.summary.succeeded, 2);
    assert!(report.check().is_ok());

    let parsed: Value = serde_json::from_str(&report.rendered).unwrap();
    assert_eq!(parsed["spec"]["name"], "explain-bench");
}

#[tokio::test]
async fn failing_grader_classifies_as_test_failure() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "mock", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "zebra");

    let bench = Benchmark::load(&spec, SpecOverrides::default()).unwrap();
    let report = bench.run(&[], "json").await.unwrap();

    let trial = &report.result.models[0].verdicts[0].trials[0];
    assert_eq!(trial.outcome, TrialOutcome::GradingFailed);
    assert_eq!(trial.score, 0.0);

    let err = report.check().unwrap_err();
    assert!(matches!(err, SkillbenchError::TestFailure { failed: 1, errors: 0 }));
    assert_eq!(err.exit_code(), EXIT_TESTS_FAILED);
}

#[tokio::test]
async fn unknown_executor_builds_nothing() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "nonexistent-engine", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo));
    let err = bench.run(&[], "json").await.unwrap_err();

    assert!(matches!(err, SkillbenchError::Config(ConfigError::Invalid(_))));
    assert!(err.to_string().contains("unknown engine type: nonexistent-engine"));
    assert_eq!(counters.built(), 0);
    assert_eq!(counters.shutdowns(), 0);
}

#[tokio::test]
async fn each_model_gets_its_own_engine_and_shutdown() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 2, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");
    write_task(dir.path(), "beta", "Explain recursion", "recursion");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo));
    let report = bench.run(&models(&["model-a", "model-b"]), "json").await.unwrap();

    assert_eq!(counters.built(), 2);
    assert_eq!(counters.shutdowns(), 2);
    assert_eq!(counters.prompts(), 8);

    let result = &report.result;
    let order: Vec<&str> = result.models.iter().map(|m| m.model.as_str()).collect();
    assert_eq!(order, vec!["model-a", "model-b"]);
    let b = result.model("model-b").unwrap();
    assert!(b.verdicts.iter().all(|v| v.model == "model-b"));
    assert!(b.verdicts[0].trials[0].output.starts_with("[model-b]"));
}

#[tokio::test]
async fn duplicate_models_are_rejected_before_construction() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo));
    let err = bench.run(&models(&["m", "m"]), "json").await.unwrap_err();

    assert!(err.to_string().contains("duplicate model: m"));
    assert_eq!(counters.built(), 0);
}

#[tokio::test]
async fn failed_construction_skips_shutdown() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(broken_registry(counters.clone()));
    let err = bench.run(&[], "json").await.unwrap_err();

    assert!(matches!(err, SkillbenchError::Engine(EngineError::Unavailable(_))));
    assert_eq!(counters.built(), 1);
    assert_eq!(counters.shutdowns(), 0);
}

#[tokio::test]
async fn invalid_format_is_reported_after_shutdown() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "zebra");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo));
    let err = bench
        .run(&models(&["m1", "m2"]), "invalid-format")
        .await
        .unwrap_err();

    // the format error wins over the failing verdicts
    assert!(!err.is_test_failure());
    assert!(err.to_string().contains("unknown output format: invalid-format"));
    assert_eq!(counters.built(), 2);
    assert_eq!(counters.shutdowns(), 2);
}

#[tokio::test]
async fn engine_errors_are_recorded_not_raised() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 2, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");
    write_task(dir.path(), "beta", "Explain recursion", "recursion");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Fail));
    let report = bench.run(&[], "json").await.unwrap();

    let run = &report.result.models[0];
    assert_eq!(run.verdicts.len(), 2);
    for verdict in &run.verdicts {
        assert!(verdict.is_error());
        for trial in &verdict.trials {
            assert_eq!(trial.outcome, TrialOutcome::EngineError);
            assert_eq!(trial.score, 0.0);
            assert_eq!(trial.error.as_deref(), Some("backend unavailable"));
            assert!(trial.grader_results.is_empty());
        }
    }
    assert_eq!(run.summary.errors, 2);
    assert_eq!(run.summary.failed, 0);
    assert!(matches!(
        report.check(),
        Err(SkillbenchError::TestFailure { failed: 0, errors: 2 })
    ));
    assert_eq!(counters.shutdowns(), 1);
}

#[tokio::test]
async fn slow_engine_times_out() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(
            counters.clone(),
            Behavior::Sleep(Duration::from_secs(30)),
        ));
    let report = bench.run(&[], "json").await.unwrap();

    let trial = &report.result.models[0].verdicts[0].trials[0];
    assert_eq!(trial.outcome, TrialOutcome::TimedOut);
    assert!(trial.error.as_deref().unwrap_or("").contains("timed out"));
    assert_eq!(counters.shutdowns(), 1);
}

#[tokio::test]
async fn events_follow_trial_order() {
    let dir = tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "mock",
        2,
        r#"graders:
  - name: non-empty
    type: code
    config:
      assertions: ["len(output) > 0"]"#,
    );
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let recorder = Arc::new(RecordingReporter::new());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_reporter(recorder.clone());
    let report = bench.run(&[], "json").await.unwrap();

    let expected_trial = [
        EventType::AgentPrompt,
        EventType::AgentResponse,
        EventType::GraderResult,
        EventType::GraderResult,
    ];
    let types = recorder.event_types();
    assert_eq!(types.len(), 8);
    assert_eq!(&types[..4], &expected_trial);
    assert_eq!(&types[4..], &expected_trial);

    // spec-level graders run ahead of task graders
    let names: Vec<&str> = report.result.models[0].verdicts[0].trials[0]
        .grader_results
        .iter()
        .map(|g| g.name.as_str())
        .collect();
    assert_eq!(names, vec!["non-empty", "mentions"]);

    let grader_events: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|e| e.event_type == EventType::GraderResult)
        .collect();
    assert_eq!(grader_events[0].detail_str("grader"), Some("non-empty"));
    assert_eq!(grader_events[0].detail_str("grader_type"), Some("code"));
}

#[tokio::test]
async fn cache_replays_engine_responses() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 2, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let cache = Arc::new(MemoryCache::new());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo))
        .with_cache(cache.clone());

    let first = bench.run(&[], "json").await.unwrap();
    assert_eq!(counters.prompts(), 2);
    assert_eq!(cache.len(), 2);

    let second = bench.run(&[], "json").await.unwrap();
    assert_eq!(counters.prompts(), 2);
    assert_eq!(counters.built(), 2);
    assert_eq!(counters.shutdowns(), 2);

    let replayed = &second.result.models[0].verdicts[0];
    assert!(replayed.trials.iter().all(|t| t.cached));
    assert_eq!(
        replayed.trials[0].output,
        first.result.models[0].verdicts[0].trials[0].output
    );
    assert_eq!(replayed.passed, first.result.models[0].verdicts[0].passed);
}

struct CoinFlip {
    name: String,
}

impl Grader for CoinFlip {
    fn grade(&self, _output: &str) -> GraderOutcome {
        GraderOutcome {
            passed: true,
            score: 1.0,
            feedback: "heads".into(),
            details: Value::Null,
        }
    }

    fn kind(&self) -> &str {
        "coin"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}

fn coin_flip(name: &str, _config: &Value) -> Result<Arc<dyn Grader>, ConfigError> {
    Ok(Arc::new(CoinFlip {
        name: name.to_string(),
    }))
}

#[tokio::test]
async fn non_deterministic_grader_disables_cache() {
    let dir = tempdir().unwrap();
    let spec = write_spec(
        dir.path(),
        "counting",
        1,
        r#"graders:
  - name: flip
    type: coin"#,
    );
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let mut graders = GraderRegistry::builtin();
    graders.register("coin", coin_flip);

    let counters = Arc::new(Counters::default());
    let cache = Arc::new(MemoryCache::new());
    let bench = Benchmark::load_with_graders(&spec, SpecOverrides::default(), &graders)
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo))
        .with_cache(cache.clone());

    bench.run(&[], "json").await.unwrap();
    let second = bench.run(&[], "json").await.unwrap();

    assert_eq!(counters.prompts(), 2);
    assert!(cache.is_empty());
    assert!(!second.result.models[0].verdicts[0].trials[0].cached);
}

#[tokio::test]
async fn multi_model_output_writes_per_model_files() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "mock", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let output = dir.path().join("out").join("results.json");
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_output(&output);
    let report = bench
        .run(&models(&["gpt/4o", "local model"]), "json")
        .await
        .unwrap();

    let per_model_a = dir.path().join("out").join("results_gpt-4o.json");
    let per_model_b = dir.path().join("out").join("results_local-model.json");
    assert_eq!(report.written, vec![output.clone(), per_model_a.clone(), per_model_b]);

    let single: Value = serde_json::from_str(&fs::read_to_string(per_model_a).unwrap()).unwrap();
    assert_eq!(single["models"].as_array().unwrap().len(), 1);
    assert_eq!(single["models"][0]["model"], "gpt/4o");
}

fn write_raw_task(dir: &Path, file: &str, body: &str) {
    let tasks = dir.join("tasks");
    fs::create_dir_all(&tasks).unwrap();
    fs::write(tasks.join(file), body).unwrap();
}

fn verdict_ids(report: &skillbench_core::BenchmarkReport) -> Vec<String> {
    report.result.models[0]
        .verdicts
        .iter()
        .map(|v| v.task_id.clone())
        .collect()
}

#[tokio::test]
async fn task_and_tag_filters_select_tasks() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "mock", 1, "");
    write_raw_task(
        dir.path(),
        "a.yaml",
        "id: closures-basic\nname: Closures\ntags: [rust, smoke]\ninputs:\n  prompt: hi\n",
    );
    write_raw_task(
        dir.path(),
        "b.yaml",
        "id: closures-advanced\ntags: [rust]\ninputs:\n  prompt: hi\n",
    );
    write_raw_task(
        dir.path(),
        "c.yaml",
        "id: iterators\nname: Iterator Basics\ntags: [smoke]\ninputs:\n  prompt: hi\n",
    );
    let bench = Benchmark::load(&spec, SpecOverrides::default()).unwrap();

    let by_id = bench
        .with_task_filter(TaskFilter::new(&models(&["closures-*"]), &[]).unwrap())
        .run(&[], "json")
        .await
        .unwrap();
    assert_eq!(verdict_ids(&by_id), vec!["closures-advanced", "closures-basic"]);

    let bench = Benchmark::load(&spec, SpecOverrides::default()).unwrap();
    let by_name_and_tag = bench
        .with_task_filter(
            TaskFilter::new(&models(&["Iterator*", "closures-basic"]), &models(&["smo*"])).unwrap(),
        )
        .run(&[], "json")
        .await
        .unwrap();
    assert_eq!(verdict_ids(&by_name_and_tag), vec!["closures-basic", "iterators"]);

    let bench = Benchmark::load(&spec, SpecOverrides::default()).unwrap();
    let by_tag = bench
        .with_task_filter(TaskFilter::new(&[], &models(&["rust"])).unwrap())
        .run(&[], "json")
        .await
        .unwrap();
    assert_eq!(verdict_ids(&by_tag), vec!["closures-advanced", "closures-basic"]);
}

#[tokio::test]
async fn filter_matching_nothing_builds_no_engine() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo))
        .with_task_filter(TaskFilter::new(&models(&["nothing-*"]), &[]).unwrap());

    let err = bench.run(&[], "json").await.unwrap_err();
    assert!(err.to_string().contains("matched no tasks"));
    assert_eq!(counters.built(), 0);
    assert!(TaskFilter::new(&models(&["[unclosed"]), &[]).is_err());
}

#[tokio::test]
async fn task_timeout_overrides_spec_timeout() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_raw_task(
        dir.path(),
        "patient.yaml",
        "id: patient\ntimeout_seconds: 5\ninputs:\n  prompt: wait\n",
    );

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(
            counters.clone(),
            Behavior::Sleep(Duration::from_millis(1500)),
        ));
    let report = bench.run(&[], "json").await.unwrap();

    let trial = &report.result.models[0].verdicts[0].trials[0];
    assert_eq!(trial.outcome, TrialOutcome::Passed);
    assert_eq!(trial.output, "late");
}

#[tokio::test]
async fn transcripts_are_written_per_task() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "mock", 2, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");
    let transcripts = dir.path().join("transcripts");

    Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_transcript_dir(&transcripts)
        .run(&models(&["Mock Model"]), "json")
        .await
        .unwrap();

    let files: Vec<PathBuf> = fs::read_dir(&transcripts)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("alpha-mock-model-"), "{name}");
    assert!(name.ends_with(".json"));

    let body: Value = serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
    assert_eq!(body["task_id"], "alpha");
    assert_eq!(body["model"], "Mock Model");
    assert_eq!(body["prompt"], "Explain closures");
    assert_eq!(body["status"], "passed");
    assert_eq!(body["trials"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn fixtures_resolve_under_spec_fixtures_dir() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_raw_task(
        dir.path(),
        "alpha.yaml",
        "id: alpha\ninputs:\n  prompt: Explain\n  files: [main.py]\n",
    );
    fs::create_dir_all(dir.path().join("fixtures")).unwrap();
    fs::write(dir.path().join("fixtures").join("main.py"), "print(1)").unwrap();

    let counters = Arc::new(Counters::default());
    let cache = Arc::new(MemoryCache::new());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo))
        .with_cache(cache.clone());
    assert_eq!(bench.context_dir(), dir.path().join("fixtures"));

    bench.run(&[], "json").await.unwrap();
    bench.run(&[], "json").await.unwrap();
    assert_eq!(counters.prompts(), 1);

    fs::write(dir.path().join("fixtures").join("main.py"), "print(2)").unwrap();
    bench.run(&[], "json").await.unwrap();
    assert_eq!(counters.prompts(), 2);
}

#[tokio::test]
async fn colliding_per_model_outputs_fail_before_running() {
    let dir = tempdir().unwrap();
    let spec = write_spec(dir.path(), "counting", 1, "");
    write_task(dir.path(), "alpha", "Explain closures", "closures");

    let counters = Arc::new(Counters::default());
    let bench = Benchmark::load(&spec, SpecOverrides::default())
        .unwrap()
        .with_engine_registry(counting_registry(counters.clone(), Behavior::Echo))
        .with_output(dir.path().join("results.json"));

    let err = bench.run(&models(&["a/b", "a-b"]), "json").await.unwrap_err();
    assert!(err.to_string().contains("same output file"), "{err}");
    assert_eq!(counters.built(), 0);
    assert!(!dir.path().join("results.json").exists());
}
