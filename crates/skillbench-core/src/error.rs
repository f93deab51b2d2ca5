//! Unified error types for skillbench.
//!
//! Per-trial failures never show up here: an engine error or a timeout is
//! recorded on the [`TrialResult`](crate::types::TrialResult) instead. What
//! remains are failures that abort a run and the distinguished
//! [`SkillbenchError::TestFailure`] classification for completed runs.

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::engine::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkillbenchError>;

/// Exit status for a run where every verdict passed.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status for a completed run with at least one failed verdict.
pub const EXIT_TESTS_FAILED: i32 = 1;
/// Exit status for configuration and runtime errors.
pub const EXIT_ERROR: i32 = 2;

#[derive(Debug, Error)]
pub enum SkillbenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("benchmark completed: {failed} failed and {errors} error(s)")]
    TestFailure { failed: usize, errors: usize },
}

impl SkillbenchError {
    /// Whether this is the "tests failed" classification rather than a hard error.
    pub fn is_test_failure(&self) -> bool {
        matches!(self, SkillbenchError::TestFailure { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_test_failure() {
            EXIT_TESTS_FAILED
        } else {
            EXIT_ERROR
        }
    }
}
