//! Task file discovery and loading.
//!
//! Task patterns from the spec are globbed relative to the spec directory,
//! parsed, checked for unique ids, and bound to their graders. The returned
//! list is sorted by task id so iteration order never depends on the
//! filesystem. A [`TaskFilter`] can then narrow that list by id, name and
//! tag globs.

use crate::config::{interpolate_env_vars, BenchmarkSpec, ConfigError, GraderSpec};
use crate::graders::{BoundGrader, GraderRegistry};
use glob::Pattern;
use globwalk::GlobWalkerBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskInputs {
    #[serde(default)]
    pub prompt: String,
    /// Fixture files, resolved against the context directory.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub inputs: TaskInputs,
    /// Per-task deadline; falls back to `config.timeout_seconds`.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub graders: Vec<GraderSpec>,
}

impl Task {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// The prompt sent to the engine: the `prompt` input, then one
    /// `File: <name>` line per fixture.
    pub fn render_prompt(&self) -> String {
        let mut prompt = self.inputs.prompt.clone();
        for file in &self.inputs.files {
            if !prompt.is_empty() {
                prompt.push('\n');
            }
            prompt.push_str("File: ");
            prompt.push_str(file);
        }
        prompt
    }
}

/// A task with its graders constructed: spec-level graders first, then the
/// task's own, in declared order.
#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub task: Task,
    pub graders: Vec<BoundGrader>,
    pub source: PathBuf,
}

impl PreparedTask {
    pub fn is_deterministic(&self) -> bool {
        self.graders.iter().all(|g| g.grader.is_deterministic())
    }
}

/// Expand the spec's task patterns into a sorted, de-duplicated file list.
pub fn resolve_task_files(
    spec: &BenchmarkSpec,
    base_dir: &Path,
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = BTreeSet::new();
    for pattern in &spec.tasks {
        let walker = GlobWalkerBuilder::from_patterns(base_dir, &[pattern.as_str()])
            .build()
            .map_err(|e| ConfigError::Invalid(format!("invalid task pattern '{pattern}': {e}")))?;
        for entry in walker {
            let entry = entry.map_err(|e| {
                ConfigError::Invalid(format!("failed to walk task pattern '{pattern}': {e}"))
            })?;
            if entry.path().is_file() {
                files.insert(entry.path().to_path_buf());
            }
        }
    }
    if files.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "no task files matched patterns: {:?}",
            spec.tasks
        )));
    }
    Ok(files.into_iter().collect())
}

pub fn parse_task_file(path: &Path) -> Result<Task, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let interpolated = interpolate_env_vars(&contents);
    serde_yaml::from_str(&interpolated).map_err(|source| ConfigError::Task {
        path: path.display().to_string(),
        source,
    })
}

/// Load every task for `spec`, building graders through `registry`.
pub fn load_tasks(
    spec: &BenchmarkSpec,
    base_dir: &Path,
    registry: &GraderRegistry,
) -> Result<Vec<PreparedTask>, ConfigError> {
    let spec_graders = spec
        .graders
        .iter()
        .map(|g| registry.build(g))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    for path in resolve_task_files(spec, base_dir)? {
        let task = parse_task_file(&path)?;
        if task.id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "task in {} is missing an id",
                path.display()
            )));
        }
        check_task(&task, &path)?;
        if !seen.insert(task.id.clone()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate task id '{}' in {}",
                task.id,
                path.display()
            )));
        }

        let mut graders = spec_graders.clone();
        for g in &task.graders {
            graders.push(registry.build(g).map_err(|e| {
                ConfigError::Invalid(format!("task '{}': {e}", task.id))
            })?);
        }
        debug!(task = %task.id, graders = graders.len(), "loaded task");
        prepared.push(PreparedTask {
            task,
            graders,
            source: path,
        });
    }

    prepared.sort_by(|a, b| a.task.id.cmp(&b.task.id));
    Ok(prepared)
}

fn check_task(task: &Task, path: &Path) -> Result<(), ConfigError> {
    if task.timeout_seconds == Some(0) {
        return Err(ConfigError::Invalid(format!(
            "task '{}' in {}: timeout_seconds must be at least 1, got 0",
            task.id,
            path.display()
        )));
    }
    for file in &task.inputs.files {
        if !is_contained(Path::new(file)) {
            return Err(ConfigError::Invalid(format!(
                "task '{}': fixture path '{file}' must be relative and stay inside the context directory",
                task.id
            )));
        }
    }
    Ok(())
}

/// Relative, with no `..` or root components.
pub fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Resolve a fixture name against `context_dir`. Returns `None` when the
/// name escapes the directory, including through symlinks, or the file does
/// not exist.
pub fn resolve_fixture(context_dir: &Path, name: &str) -> Option<PathBuf> {
    if !is_contained(Path::new(name)) {
        return None;
    }
    let root = context_dir.canonicalize().ok()?;
    let full = root.join(name).canonicalize().ok()?;
    full.starts_with(&root).then_some(full)
}

// ============================================================================
// FILTERS
// ============================================================================

/// Glob filters over task ids, names and tags. A task is kept when it
/// matches any id/name pattern and any tag pattern; an empty list matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    tasks: Vec<Pattern>,
    tags: Vec<Pattern>,
}

fn compile_patterns(kind: &str, raw: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    raw.iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| ConfigError::Invalid(format!("invalid {kind} filter pattern '{p}': {e}")))
        })
        .collect()
}

impl TaskFilter {
    pub fn new(tasks: &[String], tags: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            tasks: compile_patterns("task", tasks)?,
            tags: compile_patterns("tag", tags)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.tags.is_empty()
    }

    pub fn matches(&self, task: &Task) -> bool {
        let name_ok = self.tasks.is_empty()
            || self
                .tasks
                .iter()
                .any(|p| p.matches(&task.id) || p.matches(task.display_name()));
        let tag_ok = self.tags.is_empty()
            || self
                .tags
                .iter()
                .any(|p| task.tags.iter().any(|tag| p.matches(tag)));
        name_ok && tag_ok
    }

    /// Keep matching tasks in their existing order. Filtering everything
    /// out is an error.
    pub fn apply(&self, tasks: &[PreparedTask]) -> Result<Vec<PreparedTask>, ConfigError> {
        if self.is_empty() {
            return Ok(tasks.to_vec());
        }
        let kept: Vec<PreparedTask> = tasks
            .iter()
            .filter(|t| self.matches(&t.task))
            .cloned()
            .collect();
        if kept.is_empty() {
            return Err(ConfigError::Invalid(
                "task and tag filters matched no tasks".into(),
            ));
        }
        debug!(kept = kept.len(), total = tasks.len(), "applied task filters");
        Ok(kept)
    }
}
