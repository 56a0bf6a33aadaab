//! Scenario-based tests for pipeline-runner

mod cancellation;
mod conditions;
mod docker_ci;
mod retries;
mod runtime_labels;
