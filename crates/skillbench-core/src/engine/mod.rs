//! Agent engines: the abstraction over a model backend.
//!
//! - [`MockEngine`]: deterministic, zero-latency responses for CI
//! - [`CommandEngine`]: drives an external agent process over JSONL
//! - [`CachedEngine`]: decorator answering repeat requests from a [`Cache`](crate::cache::Cache)
//!
//! Engines are built through an [`EngineRegistry`] keyed by executor name.
//! Every constructed engine is owned by an [`EngineGuard`], which shuts it
//! down exactly once.

mod cached;
mod command;
mod mock;

pub use cached::CachedEngine;
pub use command::CommandEngine;
pub use mock::MockEngine;

use crate::config::{ConfigError, RunConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("agent process error: {0}")]
    Process(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// One prompt for one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub task_id: String,
    pub model: String,
    pub trial_index: u32,
    pub prompt: String,
    /// Fixture file names from the task inputs.
    pub files: Vec<String>,
    pub context_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineResponse {
    pub output: String,
    #[serde(default)]
    pub tool_calls: u32,
    /// Engine latency of the original call.
    #[serde(default)]
    pub duration_ms: f64,
    /// Set by [`CachedEngine`] on a hit; never persisted.
    #[serde(default, skip_serializing)]
    pub from_cache: bool,
}

impl EngineResponse {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            tool_calls: 0,
            duration_ms: 0.0,
            from_cache: false,
        }
    }
}

/// A model backend with an explicit lifecycle: construct, prompt, shut down.
///
/// Cancellation is cooperative: the trial runner drops the `send_prompt`
/// future when its deadline passes, so implementations must not leave
/// shared state half-updated across an `.await`.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    async fn send_prompt(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError>;

    async fn shutdown(&self) -> Result<(), EngineError>;

    /// Engine configuration identity, mixed into cache fingerprints.
    fn describe(&self) -> String;

    fn is_deterministic(&self) -> bool {
        false
    }
}

/// Everything a constructor needs to build an engine for one model.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub executor: String,
    pub model: String,
    pub command: Option<String>,
    pub env: BTreeMap<String, String>,
    pub work_dir: Option<PathBuf>,
}

impl EngineSettings {
    pub fn from_config(config: &RunConfig, model: &str, work_dir: Option<PathBuf>) -> Self {
        Self {
            executor: config.executor.clone(),
            model: model.to_string(),
            command: config.command.clone(),
            env: config.env.clone(),
            work_dir,
        }
    }
}

pub type EngineFactory =
    Arc<dyn Fn(&EngineSettings) -> Result<Arc<dyn AgentEngine>, EngineError> + Send + Sync>;

/// Maps executor names to engine constructors.
#[derive(Clone)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EngineRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the `mock` and `command` executors.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("mock", |settings| {
            Ok(Arc::new(MockEngine::new(&settings.model)) as Arc<dyn AgentEngine>)
        });
        registry.register("command", |settings| {
            Ok(Arc::new(CommandEngine::new(settings)?) as Arc<dyn AgentEngine>)
        });
        registry
    }

    pub fn register<F>(&mut self, executor: impl Into<String>, factory: F)
    where
        F: Fn(&EngineSettings) -> Result<Arc<dyn AgentEngine>, EngineError> + Send + Sync + 'static,
    {
        self.factories.insert(executor.into(), Arc::new(factory));
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Look up a constructor without building anything.
    pub fn resolve(&self, executor: &str) -> Result<EngineFactory, ConfigError> {
        self.factories.get(executor).cloned().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown engine type: {executor} (supported: {})",
                self.names().join(", ")
            ))
        })
    }
}

// ============================================================================
// SCOPED LIFECYCLE
// ============================================================================

async fn shutdown_with_grace(engine: &Arc<dyn AgentEngine>, grace: Duration) {
    match tokio::time::timeout(grace, engine.shutdown()).await {
        Ok(Ok(())) => debug!(engine = %engine.describe(), "engine shut down"),
        Ok(Err(e)) => warn!(engine = %engine.describe(), "engine shutdown failed: {e}"),
        Err(_) => warn!(
            engine = %engine.describe(),
            "engine shutdown timed out after {:.1}s",
            grace.as_secs_f64()
        ),
    }
}

/// Owns a constructed engine and guarantees exactly one `shutdown` call.
///
/// Call [`EngineGuard::release`] on the normal path. If the guard is dropped
/// without being released (early return, `?`, panic), `Drop` schedules the
/// shutdown on the current tokio runtime instead. Shutdown failures are
/// logged and never propagated.
pub struct EngineGuard {
    engine: Arc<dyn AgentEngine>,
    grace: Duration,
    released: bool,
}

impl EngineGuard {
    pub fn new(engine: Arc<dyn AgentEngine>, grace: Duration) -> Self {
        Self {
            engine,
            grace,
            released: false,
        }
    }

    pub fn engine(&self) -> &Arc<dyn AgentEngine> {
        &self.engine
    }

    pub async fn release(mut self) {
        self.released = true;
        shutdown_with_grace(&self.engine, self.grace).await;
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let engine = self.engine.clone();
        let grace = self.grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { shutdown_with_grace(&engine, grace).await });
            }
            Err(_) => warn!(
                engine = %engine.describe(),
                "engine dropped outside a runtime; shutdown skipped"
            ),
        }
    }
}
