//! Execution state models

use crate::core::step::StepResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Status of a single job within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for dependencies
    Pending,
    /// Eligible and waiting for a worker slot
    Ready,
    /// Steps are executing
    Running,
    /// Every step exited 0
    Succeeded,
    /// A step failed, timed out, or no worker became available
    Failed,
    /// Never ran (condition rejected it or the run was aborted)
    Skipped,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

/// Overall run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    Failure,
}

/// Mutable record of one job within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,

    /// Number of attempts started (0 if the job never ran)
    pub attempts: usize,

    /// Step results of the latest attempt
    pub step_results: Vec<StepResult>,

    /// Why the job was skipped or failed, when not explained by a step result
    pub reason: Option<String>,

    /// When the job first entered `Running`
    pub started_at: Option<DateTime<Utc>>,

    /// When the job became terminal
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn new() -> Self {
        Self {
            status: JobStatus::Pending,
            attempts: 0,
            step_results: Vec::new(),
            reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// First step of the latest attempt that did not succeed
    pub fn first_failed_step(&self) -> Option<&StepResult> {
        self.step_results.iter().find(|r| !r.is_success())
    }
}

/// One execution of a job graph
///
/// Each job record sits behind its own lock. A job has a single writer at a
/// time: the scheduling loop until the job is dispatched, its worker after.
#[derive(Debug)]
pub struct Run {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub started_at: DateTime<Utc>,

    finished_at: Mutex<Option<DateTime<Utc>>>,

    records: HashMap<String, Mutex<JobRecord>>,

    running: AtomicUsize,

    peak_running: AtomicUsize,
}

impl Run {
    /// Create a run with every job `Pending`
    pub fn new<I, S>(pipeline_name: impl Into<String>, job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
            records: job_ids
                .into_iter()
                .map(|id| (id.into(), Mutex::new(JobRecord::new())))
                .collect(),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    fn lock(record: &Mutex<JobRecord>) -> MutexGuard<'_, JobRecord> {
        record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_record<R>(&self, job_id: &str, f: impl FnOnce(&mut JobRecord) -> R) -> Option<R> {
        self.records.get(job_id).map(|record| f(&mut Self::lock(record)))
    }

    /// Current status of a job
    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.with_record(job_id, |r| r.status)
    }

    /// Snapshot of a job's record
    pub fn record(&self, job_id: &str) -> Option<JobRecord> {
        self.with_record(job_id, |r| r.clone())
    }

    /// Snapshot of every status, keyed by job ID
    pub fn statuses(&self) -> BTreeMap<String, JobStatus> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), Self::lock(record).status))
            .collect()
    }

    /// Snapshot of every record, keyed by job ID
    pub fn records(&self) -> BTreeMap<String, JobRecord> {
        self.records
            .iter()
            .map(|(id, record)| (id.clone(), Self::lock(record).clone()))
            .collect()
    }

    /// Pending -> Ready
    pub fn mark_ready(&self, job_id: &str) -> bool {
        self.with_record(job_id, |r| {
            if r.status == JobStatus::Pending {
                r.status = JobStatus::Ready;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }

    /// Ready -> Running
    pub fn mark_running(&self, job_id: &str) -> bool {
        let transitioned = self
            .with_record(job_id, |r| {
                if r.status == JobStatus::Ready {
                    r.status = JobStatus::Running;
                    r.started_at = Some(Utc::now());
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if transitioned {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_running.fetch_max(now, Ordering::SeqCst);
        }
        transitioned
    }

    /// Start a new attempt, discarding the step results of the previous one
    pub fn begin_attempt(&self, job_id: &str, attempt: usize) {
        self.with_record(job_id, |r| {
            r.attempts = attempt;
            r.step_results.clear();
        });
    }

    /// Append a step result to the current attempt
    pub fn push_step_result(&self, job_id: &str, result: StepResult) {
        self.with_record(job_id, |r| r.step_results.push(result));
    }

    /// Write a terminal status. Returns false if the job was already terminal.
    pub fn finish(&self, job_id: &str, status: JobStatus, reason: Option<String>) -> bool {
        debug_assert!(status.is_terminal());

        let previous = self.with_record(job_id, |r| {
            if r.status.is_terminal() {
                return None;
            }
            let previous = r.status;
            r.status = status;
            r.reason = reason;
            r.finished_at = Some(Utc::now());
            Some(previous)
        });

        match previous.flatten() {
            Some(JobStatus::Running) => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Number of jobs currently `Running`
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of jobs that were `Running` at the same time
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Check if every job reached a terminal status
    pub fn is_complete(&self) -> bool {
        self.records
            .values()
            .all(|record| Self::lock(record).status.is_terminal())
    }

    /// `Success` iff no job failed
    pub fn outcome(&self) -> RunOutcome {
        let any_failed = self
            .records
            .values()
            .any(|record| Self::lock(record).status == JobStatus::Failed);
        if any_failed {
            RunOutcome::Failure
        } else {
            RunOutcome::Success
        }
    }

    /// Stamp the run as finished
    pub fn finalize(&self) -> RunOutcome {
        let mut finished_at = self
            .finished_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        finished_at.get_or_insert_with(Utc::now);
        self.outcome()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *self
            .finished_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count jobs per terminal status: (succeeded, failed, skipped)
    pub fn counts(&self) -> (usize, usize, usize) {
        let statuses = self.statuses();
        let count = |s: JobStatus| statuses.values().filter(|v| **v == s).count();
        (
            count(JobStatus::Succeeded),
            count(JobStatus::Failed),
            count(JobStatus::Skipped),
        )
    }

    /// Total number of jobs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
