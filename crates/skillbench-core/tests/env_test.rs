//! Environment layering lives in its own test binary so the variable it sets
//! cannot leak into other spec-loading tests.

use skillbench_core::config::load_spec;
use std::fs;
use tempfile::tempdir;

#[test]
fn env_overrides_spec_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.yaml");
    fs::write(
        &path,
        "name: env-bench\nconfig:\n  trials_per_task: 1\ntasks:\n  - \"tasks/*.yaml\"\n",
    )
    .unwrap();

    std::env::set_var("SKILLBENCH_CONFIG__TRIALS_PER_TASK", "3");
    let loaded = load_spec(&path);
    std::env::remove_var("SKILLBENCH_CONFIG__TRIALS_PER_TASK");

    let spec = loaded.unwrap();
    assert_eq!(spec.name, "env-bench");
    assert_eq!(spec.config.trials_per_task, 3);
}
