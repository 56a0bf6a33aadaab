//! Core domain models for Pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, jobs, steps, and the state of a run.

pub mod condition;
pub mod config;
pub mod graph;
pub mod job;
pub mod pipeline;
pub mod state;
pub mod step;

pub use condition::{evaluate, DependencyOutcomes, Eligibility};
pub use config::{ConfigError, PipelineConfig};
pub use graph::{GraphError, JobGraph};
pub use job::{Job, RunCondition, DEFAULT_RUNTIME_LABEL};
pub use pipeline::*;
pub use state::*;
pub use step::*;
