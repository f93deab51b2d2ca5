use skillbench_core::config::{load_spec, load_spec_with_overrides, Aggregation, ConfigError};
use skillbench_core::SpecOverrides;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_yaml(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("bench.yaml");
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "{contents}").unwrap();
    path
}

#[test]
fn minimal_spec_gets_defaults() {
    let dir = tempdir().unwrap();
    let path = write_yaml(
        dir.path(),
        r#"
name: minimal
tasks:
  - "tasks/*.yaml"
"#,
    );

    let spec = load_spec(&path).unwrap();
    assert_eq!(spec.name, "minimal");
    assert_eq!(spec.version, "0.1.0");
    assert_eq!(spec.config.trials_per_task, 1);
    assert_eq!(spec.config.timeout_seconds, 300);
    assert_eq!(spec.config.executor, "mock");
    assert_eq!(spec.config.model, "default");
    assert_eq!(spec.config.aggregation, Aggregation::Mean);
    assert_eq!(spec.config.shutdown_grace_seconds, 5.0);
    assert!(spec.graders.is_empty());
}

#[test]
fn full_spec_parses() {
    let dir = tempdir().unwrap();
    let path = write_yaml(
        dir.path(),
        r#"
name: full
skill: code-explainer
version: "2.0.0"
description: Explains code
config:
  trials_per_task: 4
  timeout_seconds: 60
  executor: command
  model: gpt-4o
  aggregation: weighted
  shutdown_grace_seconds: 1.5
  command: "python agent.py"
  env:
    AGENT_MODE: strict
graders:
  - name: no-errors
    type: keyword
    weight: 2.0
    config:
      must_not_contain: ["error"]
tasks:
  - "tasks/*.yaml"
  - "extra/**/*.yaml"
"#,
    );

    let spec = load_spec(&path).unwrap();
    assert_eq!(spec.skill, "code-explainer");
    assert_eq!(spec.version, "2.0.0");
    assert_eq!(spec.config.trials_per_task, 4);
    assert_eq!(spec.config.aggregation, Aggregation::Weighted);
    assert_eq!(spec.config.command.as_deref(), Some("python agent.py"));
    assert_eq!(spec.config.env.get("AGENT_MODE").map(String::as_str), Some("strict"));
    assert_eq!(spec.graders[0].kind, "keyword");
    assert_eq!(spec.graders[0].weight, 2.0);
    assert_eq!(spec.tasks.len(), 2);
}

#[test]
fn overrides_take_precedence_over_file() {
    let dir = tempdir().unwrap();
    let path = write_yaml(
        dir.path(),
        r#"
name: overridden
config:
  trials_per_task: 2
  timeout_seconds: 100
  executor: mock
tasks:
  - "*.yaml"
"#,
    );

    let spec = load_spec_with_overrides(
        &path,
        SpecOverrides {
            trials_per_task: Some(7),
            timeout_seconds: None,
            executor: Some("command".into()),
        },
    )
    .unwrap();
    assert_eq!(spec.config.trials_per_task, 7);
    assert_eq!(spec.config.timeout_seconds, 100);
    assert_eq!(spec.config.executor, "command");
}

#[test]
fn env_interpolation_uses_defaults() {
    let dir = tempdir().unwrap();
    std::env::remove_var("SKILLBENCH_TEST_MISSING_MODEL");
    let path = write_yaml(
        dir.path(),
        r#"
name: interpolated
config:
  model: ${SKILLBENCH_TEST_MISSING_MODEL:-claude-like}
tasks:
  - "*.yaml"
"#,
    );

    let spec = load_spec(&path).unwrap();
    assert_eq!(spec.config.model, "claude-like");
}

fn invalid_message(yaml: &str) -> String {
    let dir = tempdir().unwrap();
    let path = write_yaml(dir.path(), yaml);
    match load_spec(&path) {
        Err(ConfigError::Invalid(msg)) => msg,
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[test]
fn validation_rejects_bad_values() {
    assert!(invalid_message("name: x\nconfig:\n  trials_per_task: 0\ntasks: ['a']")
        .contains("trials_per_task must be at least 1"));
    assert!(invalid_message("name: x\nconfig:\n  timeout_seconds: 0\ntasks: ['a']")
        .contains("timeout_seconds must be at least 1"));
    assert!(invalid_message("name: x\nconfig:\n  shutdown_grace_seconds: 0\ntasks: ['a']")
        .contains("shutdown_grace_seconds must be positive"));
    assert!(invalid_message("name: '  '\ntasks: ['a']").contains("spec name must not be empty"));
    assert!(invalid_message("name: x").contains("at least one task pattern"));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = load_spec(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
