//! Core library for skillbench, a benchmark harness for agent skills.
//!
//! This crate provides the building blocks for evaluating how well an agent
//! performs a skill:
//!
//! - [`config`]: Benchmark spec loading and validation
//! - [`tasks`]: Task discovery and grader binding
//! - [`graders`]: Pure output scorers (assertions, keywords, regex)
//! - [`engine`]: Agent engines (mock, external command, cache decorator)
//! - [`cache`]: Content-addressed response cache
//! - [`runner`]: Trial and task execution
//! - [`orchestrator`]: Per-model sequential execution pipeline
//! - [`reporter`]: Progress events for observers
//! - [`report`]: Output formats for completed runs
//! - [`transcript`]: Per-task JSON transcripts
//! - [`error`]: Unified error types and exit codes
//!
//! # Architecture
//!
//! A [`Benchmark`] loads a spec and its tasks, then hands them to the
//! [`Orchestrator`]. For each requested model the orchestrator builds one
//! engine, runs every task's trials against it, and shuts it down exactly
//! once before moving on. Per-trial failures are recorded in the results;
//! only configuration and runtime problems abort a run.

// Foundation modules (no internal dependencies)
pub mod types;

// Error types
pub mod error;

// Core modules
pub mod cache;
pub mod config;
pub mod engine;
pub mod graders;
pub mod tasks;

// Execution
pub mod benchmark;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod transcript;

pub use benchmark::{Benchmark, BenchmarkReport};
pub use config::{BenchmarkSpec, SpecOverrides};
pub use error::{Result, SkillbenchError};
pub use orchestrator::Orchestrator;
pub use tasks::TaskFilter;
pub use types::{BenchmarkResult, TaskVerdict, TrialOutcome, TrialResult};
