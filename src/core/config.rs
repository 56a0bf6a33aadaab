//! Pipeline configuration from YAML

use crate::core::{graph::GraphError, job::RunCondition, Pipeline};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems that prevent a pipeline from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid job '{job}': {message}")]
    InvalidJob { job: String, message: String },

    #[error("invalid setting '{setting}': {message}")]
    InvalidSetting { setting: String, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Pipeline-wide variables, exported to every step's environment
    #[serde(default)]
    variables: BTreeMap<String, Value>,

    /// Maximum number of concurrently running jobs
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Maximum number of retries per job (global default)
    #[serde(default, alias = "maxRetries")]
    pub max_retries: Option<usize>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// How long a job may wait for a worker with its runtime label (in seconds)
    #[serde(default)]
    pub scheduling_timeout_secs: Option<u64>,

    /// Runtime label -> number of workers advertising it
    #[serde(default)]
    pub runners: Option<BTreeMap<String, usize>>,

    /// Jobs, in declaration order
    #[serde(with = "job_map")]
    pub jobs: Vec<JobConfig>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job identifier, taken from the mapping key
    #[serde(skip)]
    pub id: String,

    /// Steps, executed in order
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// List of job IDs this job depends on
    #[serde(default, alias = "dependsOn", alias = "needs")]
    pub depends_on: Vec<String>,

    /// When the job should run given its dependencies' outcome
    #[serde(default, alias = "if")]
    pub condition: RunCondition,

    /// Which worker pool may run this job
    #[serde(default, alias = "runtimeLabel", alias = "runs-on")]
    pub runtime_label: Option<String>,

    /// Maximum retries for this job (overrides global)
    #[serde(default, alias = "maxRetries")]
    pub max_retries: Option<usize>,

    /// Timeout for this job's steps (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command line
    #[serde(alias = "run")]
    pub command: String,

    /// Working directory
    #[serde(default, alias = "working-directory")]
    pub workdir: Option<String>,

    /// Environment overrides
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Timeout for this step (overrides job and global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StepConfig {
    /// Get env overrides as strings
    pub fn env_as_string_map(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()
    }
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

/// Render a scalar YAML value the way a shell would expect it
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        // Fallback: convert to string
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

/// (De)serialize the `jobs` mapping as an ordered list, keeping repeated keys
/// so they can be reported as duplicate jobs instead of silently overwritten.
mod job_map {
    use super::JobConfig;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(jobs: &[JobConfig], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(jobs.len()))?;
        for job in jobs {
            map.serialize_entry(&job.id, job)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<JobConfig>, D::Error> {
        struct JobMapVisitor;

        impl<'de> Visitor<'de> for JobMapVisitor {
            type Value = Vec<JobConfig>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping from job name to job definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut jobs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, mut job)) = access.next_entry::<String, JobConfig>()? {
                    job.id = id;
                    jobs.push(job);
                }
                Ok(jobs)
            }
        }

        deserializer.deserialize_map(JobMapVisitor)
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration, including the job graph
    pub fn validate(&self) -> Result<(), ConfigError> {
        for job in &self.jobs {
            if job.steps.is_empty() {
                return Err(ConfigError::InvalidJob {
                    job: job.id.clone(),
                    message: "job has no steps".to_string(),
                });
            }
            if let Some(step) = job.steps.iter().find(|s| s.command.trim().is_empty()) {
                return Err(ConfigError::InvalidJob {
                    job: job.id.clone(),
                    message: format!(
                        "step '{}' has an empty command",
                        step.name.as_deref().unwrap_or("<unnamed>")
                    ),
                });
            }
            if job.runtime_label.as_deref().is_some_and(|l| l.trim().is_empty()) {
                return Err(ConfigError::InvalidJob {
                    job: job.id.clone(),
                    message: "runtime label is empty".to_string(),
                });
            }
        }

        if self.concurrency == Some(0) {
            return Err(ConfigError::InvalidSetting {
                setting: "concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if let Some(runners) = &self.runners {
            if let Some((label, _)) = runners.iter().find(|(_, capacity)| **capacity == 0) {
                return Err(ConfigError::InvalidSetting {
                    setting: format!("runners.{}", label),
                    message: "a runner pool needs at least one worker".to_string(),
                });
            }
        }

        // Duplicate IDs, dangling dependencies and cycles
        self.to_pipeline()?;
        Ok(())
    }

    /// Get variables as string map
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()
    }

    /// Override a variable (e.g. from the command line)
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), Value::String(value.into()));
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline, GraphError> {
        Pipeline::from_config(self)
    }
}
