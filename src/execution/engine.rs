//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{evaluate, Eligibility, Job, JobStatus, Pipeline, Run, RunOutcome, StepOutcome},
    execution::{
        cancel::CancelSignal,
        executor::{JobExecutor, JobOutcome},
        runner::CommandRunner,
        scheduler::{ExecutionScheduler, SchedulingError},
    },
};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_jobs: usize,
    },
    JobReady {
        job_id: String,
    },
    JobStarted {
        job_id: String,
        attempt: usize,
    },
    StepFinished {
        job_id: String,
        step: String,
        exit_code: i32,
        outcome: StepOutcome,
        duration_ms: u64,
    },
    JobRetrying {
        job_id: String,
        attempt: usize,
        max_retries: usize,
    },
    JobFinished {
        job_id: String,
        status: JobStatus,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    PipelineFinished {
        execution_id: Uuid,
        outcome: RunOutcome,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .handlers
            .read()
            .map(|handlers| handlers.len())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

/// Main pipeline execution engine
///
/// The dispatch loop owns every job until it is handed to a worker. Workers
/// report back over a completion channel, and each completion re-evaluates the
/// finished job's direct dependents.
pub struct ExecutionEngine<R> {
    executor: Arc<JobExecutor<R>>,
    scheduler: ExecutionScheduler,
    events: EventBus,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(executor: JobExecutor<R>, scheduler: ExecutionScheduler) -> Self {
        Self {
            executor: Arc::new(executor),
            scheduler,
            events: EventBus::default(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add_handler(handler);
    }

    /// Drive `run` until every job of `pipeline` is terminal
    pub async fn execute(&self, pipeline: &Pipeline, run: Arc<Run>, mut cancel: CancelSignal) {
        let graph = &pipeline.graph;
        info!(
            "Starting pipeline execution: {} ({}), {} jobs, concurrency {}",
            run.pipeline_name,
            run.execution_id,
            graph.len(),
            self.scheduler.concurrency()
        );
        self.events.emit(ExecutionEvent::PipelineStarted {
            execution_id: run.execution_id,
            pipeline_name: run.pipeline_name.clone(),
            total_jobs: graph.len(),
        });

        let mut unserved: Vec<&str> = graph
            .jobs()
            .map(|job| job.runtime_label.as_str())
            .filter(|label| !self.scheduler.serves(label))
            .collect();
        unserved.sort_unstable();
        unserved.dedup();
        for label in unserved {
            warn!("No runner advertises label '{}'; its jobs will wait for a worker", label);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut dispatch = Dispatch {
            worklist: pipeline.execution_order().iter().cloned().collect(),
            in_flight: 0,
            aborted: cancel.is_cancelled(),
        };

        self.advance(pipeline, &run, &mut dispatch, &tx, &cancel);

        while dispatch.in_flight > 0 {
            tokio::select! {
                Some(job_id) = rx.recv() => {
                    dispatch.in_flight -= 1;
                    dispatch.worklist.extend(graph.dependents(&job_id).iter().cloned());
                }
                _ = cancel.cancelled(), if !dispatch.aborted => {
                    warn!("Run {} aborted; skipping jobs that have not started", run.execution_id);
                    dispatch.aborted = true;
                    dispatch.worklist.extend(pipeline.execution_order().iter().cloned());
                }
                else => break,
            }
            self.advance(pipeline, &run, &mut dispatch, &tx, &cancel);
        }

        run.finalize();
        let outcome = run.outcome();
        let (succeeded, failed, skipped) = run.counts();
        info!(
            "Pipeline {} finished: {:?} ({} succeeded, {} failed, {} skipped, peak concurrency {})",
            run.pipeline_name,
            outcome,
            succeeded,
            failed,
            skipped,
            run.peak_running()
        );
        self.events.emit(ExecutionEvent::PipelineFinished {
            execution_id: run.execution_id,
            outcome,
        });
    }

    /// Settle every queued job whose dependencies allow a decision
    fn advance(
        &self,
        pipeline: &Pipeline,
        run: &Arc<Run>,
        dispatch: &mut Dispatch,
        tx: &mpsc::UnboundedSender<String>,
        cancel: &CancelSignal,
    ) {
        if !dispatch.aborted && cancel.is_cancelled() {
            dispatch.aborted = true;
            dispatch.worklist.extend(pipeline.execution_order().iter().cloned());
        }

        while let Some(job_id) = dispatch.worklist.pop_front() {
            if run.status(&job_id) != Some(JobStatus::Pending) {
                continue;
            }
            let Some(job) = pipeline.job(&job_id) else {
                continue;
            };

            let eligibility = if dispatch.aborted {
                Eligibility::Skip("cancelled".to_string())
            } else {
                evaluate(job.condition, &pipeline.graph.dependency_outcomes(job, run))
            };

            match eligibility {
                Eligibility::Wait => {}
                Eligibility::Skip(reason) => {
                    if run.finish(&job_id, JobStatus::Skipped, Some(reason.clone())) {
                        info!("Skipping job '{}': {}", job_id, reason);
                        self.events.emit(ExecutionEvent::JobSkipped {
                            job_id: job_id.clone(),
                            reason,
                        });
                        dispatch
                            .worklist
                            .extend(pipeline.graph.dependents(&job_id).iter().cloned());
                    }
                }
                Eligibility::Run => {
                    if run.mark_ready(&job_id) {
                        self.events.emit(ExecutionEvent::JobReady {
                            job_id: job_id.clone(),
                        });
                        self.spawn_worker(job.clone(), run.clone(), tx.clone(), cancel.clone());
                        dispatch.in_flight += 1;
                    }
                }
            }
        }
    }

    fn spawn_worker(
        &self,
        job: Job,
        run: Arc<Run>,
        tx: mpsc::UnboundedSender<String>,
        cancel: CancelSignal,
    ) {
        let worker = Worker {
            executor: self.executor.clone(),
            scheduler: self.scheduler.clone(),
            events: self.events.clone(),
        };

        tokio::spawn(async move {
            let job_id = job.id.clone();
            let inner_run = run.clone();
            let inner_events = worker.events.clone();

            let handle = tokio::spawn(async move { worker.run_job(job, inner_run, cancel).await });
            if let Err(e) = handle.await {
                error!("Worker for job '{}' crashed: {}", job_id, e);
                if run.finish(&job_id, JobStatus::Failed, Some(format!("worker crashed: {}", e))) {
                    inner_events.emit(ExecutionEvent::JobFinished {
                        job_id: job_id.clone(),
                        status: JobStatus::Failed,
                    });
                }
            }

            // The loop may already be gone if it was dropped mid-run
            let _ = tx.send(job_id);
        });
    }
}

struct Dispatch {
    worklist: VecDeque<String>,
    in_flight: usize,
    aborted: bool,
}

/// Everything a dispatched job needs, detached from the engine's lifetime
struct Worker<R> {
    executor: Arc<JobExecutor<R>>,
    scheduler: ExecutionScheduler,
    events: EventBus,
}

impl<R: CommandRunner> Worker<R> {
    async fn run_job(&self, job: Job, run: Arc<Run>, cancel: CancelSignal) {
        let slot = match self.scheduler.acquire(&job.runtime_label, cancel.clone()).await {
            Ok(slot) => slot,
            Err(SchedulingError::Cancelled) => {
                self.settle(&job, &run, JobOutcome::cancelled());
                return;
            }
            Err(e) => {
                error!("Job '{}' could not be scheduled: {}", job.id, e);
                self.settle(
                    &job,
                    &run,
                    JobOutcome {
                        status: JobStatus::Failed,
                        reason: Some(e.to_string()),
                    },
                );
                return;
            }
        };

        if !run.mark_running(&job.id) {
            return;
        }

        let outcome = self.executor.execute(&job, &run, &self.events, cancel).await;
        self.settle(&job, &run, outcome);

        // Release the worker only after the terminal status is written
        drop(slot);
    }

    fn settle(&self, job: &Job, run: &Run, outcome: JobOutcome) {
        let JobOutcome { status, reason } = outcome;
        if !run.finish(&job.id, status, reason.clone()) {
            return;
        }

        match status {
            JobStatus::Skipped => {
                let reason = reason.unwrap_or_default();
                info!("Job '{}' skipped: {}", job.id, reason);
                self.events.emit(ExecutionEvent::JobSkipped {
                    job_id: job.id.clone(),
                    reason,
                });
            }
            JobStatus::Failed => {
                warn!(
                    "Job '{}' failed: {}",
                    job.id,
                    reason.as_deref().unwrap_or("unknown reason")
                );
                self.events.emit(ExecutionEvent::JobFinished {
                    job_id: job.id.clone(),
                    status,
                });
            }
            _ => {
                info!("Job '{}' succeeded", job.id);
                self.events.emit(ExecutionEvent::JobFinished {
                    job_id: job.id.clone(),
                    status,
                });
            }
        }
    }
}
