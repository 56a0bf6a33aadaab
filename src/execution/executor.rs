//! Job executor - runs a job's steps through a command runner

use crate::{
    core::{Job, JobStatus, Run, Step, StepOutcome, StepResult},
    execution::{
        cancel::CancelSignal,
        engine::{EventBus, ExecutionEvent},
        runner::{CommandInvocation, CommandRunner},
    },
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Terminal status a job attempt loop settled on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub reason: Option<String>,
}

impl JobOutcome {
    fn succeeded() -> Self {
        Self {
            status: JobStatus::Succeeded,
            reason: None,
        }
    }

    fn failed(reason: String) -> Self {
        Self {
            status: JobStatus::Failed,
            reason: Some(reason),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            status: JobStatus::Skipped,
            reason: Some("cancelled".to_string()),
        }
    }
}

enum Attempt {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Executes jobs step by step
pub struct JobExecutor<R> {
    runner: R,
    variables: HashMap<String, String>,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            variables: HashMap::new(),
        }
    }

    /// Pipeline variables rendered into commands and exported to every step
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn invocation(&self, job: &Job, step: &Step) -> CommandInvocation {
        CommandInvocation {
            command: step.render_command(&self.variables),
            workdir: step.workdir.clone(),
            env: step.effective_env(&self.variables),
            timeout: step.effective_timeout(job.timeout_secs),
        }
    }

    /// Run a job to a terminal status, retrying failed attempts up to `max_retries` times.
    ///
    /// The job must already be `Running` in `run`; the caller writes the terminal status.
    pub async fn execute(
        &self,
        job: &Job,
        run: &Run,
        events: &EventBus,
        cancel: CancelSignal,
    ) -> JobOutcome {
        let max_attempts = job.max_retries + 1;

        for attempt in 1..=max_attempts {
            run.begin_attempt(&job.id, attempt);
            info!("Starting job '{}' (attempt {}/{})", job.id, attempt, max_attempts);
            events.emit(ExecutionEvent::JobStarted {
                job_id: job.id.clone(),
                attempt,
            });

            match self.execute_attempt(job, run, events, cancel.clone()).await {
                Attempt::Succeeded => return JobOutcome::succeeded(),
                Attempt::Cancelled => {
                    info!("Job '{}' cancelled", job.id);
                    return JobOutcome::cancelled();
                }
                Attempt::Failed(reason) => {
                    if cancel.is_cancelled() {
                        return JobOutcome::cancelled();
                    }
                    if attempt < max_attempts {
                        warn!(
                            "Job '{}' failed ({}); retrying ({}/{})",
                            job.id, reason, attempt, job.max_retries
                        );
                        events.emit(ExecutionEvent::JobRetrying {
                            job_id: job.id.clone(),
                            attempt: attempt + 1,
                            max_retries: job.max_retries,
                        });
                        continue;
                    }
                    return JobOutcome::failed(reason);
                }
            }
        }

        // max_attempts is at least 1, so the loop always returns
        JobOutcome::failed("job made no attempts".to_string())
    }

    async fn execute_attempt(
        &self,
        job: &Job,
        run: &Run,
        events: &EventBus,
        cancel: CancelSignal,
    ) -> Attempt {
        for step in &job.steps {
            if cancel.is_cancelled() {
                return Attempt::Cancelled;
            }

            let invocation = self.invocation(job, step);
            debug!("Job '{}' step '{}': {}", job.id, step.display_name(), invocation.command);

            let result = self.runner.execute(&invocation, cancel.clone()).await;
            let verdict = step_verdict(step, &result);

            events.emit(ExecutionEvent::StepFinished {
                job_id: job.id.clone(),
                step: step.display_name().to_string(),
                exit_code: result.exit_code,
                outcome: result.outcome,
                duration_ms: result.duration_ms,
            });
            run.push_step_result(&job.id, result);

            if let Some(verdict) = verdict {
                return verdict;
            }
        }

        Attempt::Succeeded
    }
}

/// None when the step succeeded and the job should move on
fn step_verdict(step: &Step, result: &StepResult) -> Option<Attempt> {
    match result.outcome {
        StepOutcome::Cancelled => Some(Attempt::Cancelled),
        StepOutcome::TimedOut => Some(Attempt::Failed(format!(
            "step '{}' timed out",
            step.display_name()
        ))),
        StepOutcome::Exited if result.exit_code != 0 => Some(Attempt::Failed(format!(
            "step '{}' exited with code {}",
            step.display_name(),
            result.exit_code
        ))),
        StepOutcome::Exited => None,
    }
}
