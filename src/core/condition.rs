//! Run-condition evaluation
//!
//! Decides whether a job runs once its dependencies have settled. The
//! evaluator is pure: callers hand it the terminal statuses of the direct
//! dependencies plus whether anything further upstream failed.

use crate::core::{job::RunCondition, state::JobStatus};

/// Decision for a job whose dependencies have been inspected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Dispatch the job
    Run,
    /// Never run the job; the string explains why
    Skip(String),
    /// Some dependency is not terminal yet
    Wait,
}

/// Outcome of a job's dependencies
#[derive(Debug, Clone, Default)]
pub struct DependencyOutcomes<'a> {
    /// Status of each direct dependency
    pub direct: Vec<(&'a str, JobStatus)>,

    /// Whether any transitive dependency failed
    pub upstream_failed: bool,
}

impl<'a> DependencyOutcomes<'a> {
    pub fn new(direct: Vec<(&'a str, JobStatus)>) -> Self {
        Self {
            direct,
            upstream_failed: false,
        }
    }

    pub fn with_upstream_failed(mut self, upstream_failed: bool) -> Self {
        self.upstream_failed = upstream_failed;
        self
    }

    fn all_terminal(&self) -> bool {
        self.direct.iter().all(|(_, status)| status.is_terminal())
    }

    fn first_not_succeeded(&self) -> Option<(&'a str, JobStatus)> {
        self.direct
            .iter()
            .copied()
            .find(|(_, status)| *status != JobStatus::Succeeded)
    }

    fn any_direct_failed(&self) -> bool {
        self.direct
            .iter()
            .any(|(_, status)| *status == JobStatus::Failed)
    }
}

/// Evaluate a run-condition against dependency outcomes
pub fn evaluate(condition: RunCondition, deps: &DependencyOutcomes<'_>) -> Eligibility {
    if !deps.all_terminal() {
        return Eligibility::Wait;
    }

    match condition {
        RunCondition::OnSuccess => {
            if let Some((dep, status)) = deps.first_not_succeeded() {
                Eligibility::Skip(format!("dependency '{}' {}", dep, describe(status)))
            } else if deps.upstream_failed {
                Eligibility::Skip("an upstream job failed".to_string())
            } else {
                Eligibility::Run
            }
        }
        RunCondition::Always => Eligibility::Run,
        // Only direct dependencies count; a skipped dependency never ran
        RunCondition::OnFailure => {
            if deps.any_direct_failed() {
                Eligibility::Run
            } else {
                Eligibility::Skip("no dependency failed".to_string())
            }
        }
    }
}

fn describe(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Failed => "failed",
        JobStatus::Skipped => "was skipped",
        _ => "did not succeed",
    }
}
