//! Run reports - the serializable outcome of a finished run

use crate::core::{JobRecord, JobStatus, Run, RunOutcome, StepResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Number of stderr lines shown for a failed job
pub const STDERR_TAIL_LINES: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to access report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-job section of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub id: String,
    pub status: JobStatus,
    pub attempts: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Step results of the final attempt
    #[serde(default)]
    pub steps: Vec<StepResult>,
}

impl JobReport {
    fn from_record(id: &str, record: JobRecord) -> Self {
        Self {
            id: id.to_string(),
            status: record.status,
            attempts: record.attempts,
            reason: record.reason,
            started_at: record.started_at,
            finished_at: record.finished_at,
            steps: record.step_results,
        }
    }

    /// First step that did not succeed
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|step| !step.is_success())
    }

    /// What to show for a failed job: the failing step's stderr tail, or the
    /// reason when no step explains it (e.g. a scheduling timeout)
    pub fn failure_detail(&self) -> Option<String> {
        if self.status != JobStatus::Failed {
            return None;
        }

        let tail = self
            .failed_step()
            .map(|step| step.stderr_tail(STDERR_TAIL_LINES))
            .filter(|tail| !tail.trim().is_empty());

        tail.or_else(|| self.reason.clone())
    }

    pub fn duration_ms(&self) -> u64 {
        self.steps.iter().map(|step| step.duration_ms).sum()
    }
}

/// Snapshot of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Highest number of jobs that ran at once
    pub peak_concurrency: usize,

    /// Every job, in execution order
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    /// Build a report listing jobs in `order`; jobs missing from `order` follow by ID
    pub fn from_run(run: &Run, order: &[String]) -> Self {
        let mut records = run.records();
        let mut jobs = Vec::with_capacity(records.len());

        for id in order {
            if let Some(record) = records.remove(id) {
                jobs.push(JobReport::from_record(id, record));
            }
        }
        jobs.extend(
            records
                .into_iter()
                .map(|(id, record)| JobReport::from_record(&id, record)),
        );

        Self {
            execution_id: run.execution_id,
            pipeline_name: run.pipeline_name.clone(),
            outcome: run.outcome(),
            started_at: run.started_at,
            finished_at: run.finished_at(),
            peak_concurrency: run.peak_running(),
            jobs,
        }
    }

    pub fn job(&self, id: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.job(id).map(|job| job.status)
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|job| job.status == JobStatus::Failed)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ReportError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }
}
