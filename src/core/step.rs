//! Step domain model

use crate::core::config::StepConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A single command inside a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Display name (defaults to the command line)
    pub name: Option<String>,

    /// Command line template, rendered with pipeline variables before execution
    pub command: String,

    /// Working directory (relative paths resolve against the process cwd)
    pub workdir: Option<PathBuf>,

    /// Environment overrides for this step only
    pub env: HashMap<String, String>,

    /// Timeout for this step (None = inherit the job default)
    pub timeout_secs: Option<u64>,
}

impl Step {
    /// Create a step running `command` with no overrides
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            name: None,
            command: command.into(),
            workdir: None,
            env: HashMap::new(),
            timeout_secs: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Create a step from a step config
    pub fn from_config(config: &StepConfig) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            workdir: config.workdir.as_ref().map(PathBuf::from),
            env: config.env_as_string_map(),
            timeout_secs: config.timeout_secs,
        }
    }

    /// Label used in logs and reports
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }

    /// Render the command with variable substitution.
    ///
    /// `{{ NAME }}` placeholders are replaced in a single pass over the
    /// template, so substituted values are never expanded again. Unknown
    /// names are left as written.
    pub fn render_command(&self, variables: &HashMap<String, String>) -> String {
        let mut rendered = String::with_capacity(self.command.len());
        let mut rest = self.command.as_str();

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let placeholder = &rest[start..start + 2 + len + 2];
            let name = rest[start + 2..start + 2 + len].trim();

            rendered.push_str(&rest[..start]);
            match variables.get(name) {
                Some(value) => rendered.push_str(value),
                None => rendered.push_str(placeholder),
            }
            rest = &rest[start + placeholder.len()..];
        }

        rendered.push_str(rest);
        rendered
    }

    /// Environment for this step: pipeline variables overlaid with step overrides
    pub fn effective_env(&self, variables: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = variables.clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Timeout to apply, falling back to the job default
    pub fn effective_timeout(&self, job_default_secs: Option<u64>) -> Option<Duration> {
        self.timeout_secs
            .or(job_default_secs)
            .map(Duration::from_secs)
    }
}

/// How a step's process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Process exited on its own; see the exit code
    Exited,
    /// Process was killed after its timeout elapsed
    TimedOut,
    /// Process was killed because the run was aborted
    Cancelled,
}

/// Captured result of one step execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// The rendered command line that was executed
    pub command: String,

    /// Exit code (-1 when the process was killed or terminated by a signal)
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub outcome: StepOutcome,
}

impl StepResult {
    /// Whether the step counts as a success
    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Exited && self.exit_code == 0
    }

    /// Last `max_lines` lines of stderr
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}
