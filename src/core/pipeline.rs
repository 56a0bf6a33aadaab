//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    graph::{GraphError, JobGraph},
    job::{Job, JobDefaults},
};
use std::collections::{BTreeMap, HashMap};

/// A validated pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Global variables available to all steps
    pub variables: HashMap<String, String>,

    /// Jobs and their dependency edges
    pub graph: JobGraph,

    /// Concurrency limit requested by the configuration
    pub concurrency: Option<usize>,

    /// Worker pools by runtime label (None = every label is served)
    pub runners: Option<BTreeMap<String, usize>>,

    /// How long a job may wait for a worker with its label (in seconds)
    pub scheduling_timeout_secs: Option<u64>,

    /// Job execution order (topological sort)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Build and validate a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, GraphError> {
        let defaults = JobDefaults {
            max_retries: config.max_retries.unwrap_or(0),
            timeout_secs: config.default_timeout_secs,
        };

        let jobs = config
            .jobs
            .iter()
            .map(|job_config| Job::from_config(job_config, &defaults));

        let mut pipeline = Self::from_jobs(&config.name, jobs)?;
        pipeline.variables = config.variables_as_string_map();
        pipeline.concurrency = config.concurrency;
        pipeline.runners = config.runners.clone();
        pipeline.scheduling_timeout_secs = config.scheduling_timeout_secs;
        Ok(pipeline)
    }

    /// Build and validate a pipeline from jobs
    pub fn from_jobs<I>(name: impl Into<String>, jobs: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Job>,
    {
        let mut graph = JobGraph::new();
        for job in jobs {
            graph.add_job(job)?;
        }
        graph.validate()?;

        let execution_order = graph.execution_order();

        Ok(Pipeline {
            name: name.into(),
            variables: HashMap::new(),
            graph,
            concurrency: None,
            runners: None,
            scheduling_timeout_secs: None,
            execution_order,
        })
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_runner(mut self, label: impl Into<String>, capacity: usize) -> Self {
        self.runners
            .get_or_insert_with(BTreeMap::new)
            .insert(label.into(), capacity);
        self
    }

    pub fn with_scheduling_timeout_secs(mut self, secs: u64) -> Self {
        self.scheduling_timeout_secs = Some(secs);
        self
    }

    /// Get a job by ID
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.graph.job(id)
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Runtime labels that jobs ask for but no runner advertises
    pub fn unserved_labels(&self) -> Vec<String> {
        let Some(runners) = &self.runners else {
            return Vec::new();
        };

        let mut labels: Vec<String> = self
            .graph
            .jobs()
            .map(|job| job.runtime_label.clone())
            .filter(|label| !runners.contains_key(label))
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}
