//! pipeline-runner - dependency-aware job graph execution

pub mod cli;
pub mod controller;
pub mod core;
pub mod execution;
pub mod report;

// Re-export commonly used types
pub use crate::controller::{ExecutionPlan, PipelineController};
pub use crate::core::{
    ConfigError, GraphError, Job, JobGraph, JobStatus, Pipeline, PipelineConfig, Run,
    RunCondition, RunOutcome, Step, StepOutcome, StepResult,
};
pub use crate::execution::{
    AbortHandle, CommandInvocation, CommandRunner, ExecutionEngine, ExecutionEvent, ShellRunner,
};
pub use crate::report::{JobReport, RunReport};
