//! Job domain model

use crate::core::{config::JobConfig, step::Step};
use serde::{Deserialize, Serialize};

/// Runtime label used by jobs that don't ask for one
pub const DEFAULT_RUNTIME_LABEL: &str = "default";

/// Policy deciding whether a job runs given the outcome of its dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunCondition {
    /// Run only if every dependency succeeded and nothing upstream failed
    #[default]
    OnSuccess,
    /// Run once every dependency is terminal, whatever the outcome
    Always,
    /// Run only if a dependency (or anything upstream) failed
    OnFailure,
}

/// A named unit of work: ordered steps plus dependency edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique job identifier
    pub id: String,

    /// Steps, executed strictly in order
    pub steps: Vec<Step>,

    /// IDs of jobs this job depends on
    pub dependencies: Vec<String>,

    pub condition: RunCondition,

    /// Worker pool this job must be routed to
    pub runtime_label: String,

    /// How many times a failed attempt is re-run
    pub max_retries: usize,

    /// Default timeout for steps that don't set one
    pub timeout_secs: Option<u64>,
}

/// Values applied to jobs that don't override them
#[derive(Debug, Clone, Default)]
pub struct JobDefaults {
    pub max_retries: usize,
    pub timeout_secs: Option<u64>,
}

impl Job {
    /// Create a job with default settings and no steps
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            dependencies: Vec::new(),
            condition: RunCondition::OnSuccess,
            runtime_label: DEFAULT_RUNTIME_LABEL.to_string(),
            max_retries: 0,
            timeout_secs: None,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_condition(mut self, condition: RunCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_runtime_label(mut self, label: impl Into<String>) -> Self {
        self.runtime_label = label.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Create a job from its configuration
    pub fn from_config(config: &JobConfig, defaults: &JobDefaults) -> Self {
        Self {
            id: config.id.clone(),
            steps: config.steps.iter().map(Step::from_config).collect(),
            dependencies: config.depends_on.clone(),
            condition: config.condition,
            runtime_label: config
                .runtime_label
                .clone()
                .unwrap_or_else(|| DEFAULT_RUNTIME_LABEL.to_string()),
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            timeout_secs: config.timeout_secs.or(defaults.timeout_secs),
        }
    }
}
