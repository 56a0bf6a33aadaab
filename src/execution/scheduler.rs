//! Execution scheduler - hands out worker slots by runtime label

use crate::core::Pipeline;
use crate::execution::cancel::CancelSignal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Default bound on how long a job may wait for a worker with its label
pub const DEFAULT_SCHEDULING_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("no worker with runtime label '{label}' became available within {waited:?}")]
    Timeout { label: String, waited: Duration },

    #[error("cancelled while waiting for a worker")]
    Cancelled,
}

/// Both slots a running job holds. Dropping it frees them.
#[derive(Debug)]
pub struct WorkerSlot {
    _label: Option<OwnedSemaphorePermit>,
    _global: OwnedSemaphorePermit,
}

/// Worker pools keyed by runtime label, plus the global concurrency limit
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    global: Arc<Semaphore>,
    concurrency: usize,

    /// None means every label is served
    pools: Option<HashMap<String, Arc<Semaphore>>>,

    scheduling_timeout: Duration,
}

impl ExecutionScheduler {
    /// Scheduler that serves every label, bounded only by `concurrency`
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            global: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            pools: None,
            scheduling_timeout: DEFAULT_SCHEDULING_TIMEOUT,
        }
    }

    /// Scheduler configured from a pipeline's runners and scheduling timeout
    pub fn for_pipeline(pipeline: &Pipeline, concurrency: usize) -> Self {
        let mut scheduler = Self::new(concurrency);
        if let Some(runners) = &pipeline.runners {
            for (label, capacity) in runners {
                scheduler = scheduler.with_pool(label.clone(), *capacity);
            }
        }
        if let Some(secs) = pipeline.scheduling_timeout_secs {
            scheduler = scheduler.with_scheduling_timeout(Duration::from_secs(secs));
        }
        scheduler
    }

    /// Declare a worker pool; once any pool exists, unlisted labels are unserved
    pub fn with_pool(mut self, label: impl Into<String>, capacity: usize) -> Self {
        self.pools
            .get_or_insert_with(HashMap::new)
            .insert(label.into(), Arc::new(Semaphore::new(capacity)));
        self
    }

    pub fn with_scheduling_timeout(mut self, timeout: Duration) -> Self {
        self.scheduling_timeout = timeout;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Whether some worker advertises `label`
    pub fn serves(&self, label: &str) -> bool {
        match &self.pools {
            None => true,
            Some(pools) => pools.contains_key(label),
        }
    }

    /// Wait for a worker with `label` and a global slot.
    ///
    /// The label slot is taken first and is subject to the scheduling timeout;
    /// the global slot is not, since it only ever waits on running jobs.
    pub async fn acquire(
        &self,
        label: &str,
        mut cancel: CancelSignal,
    ) -> Result<WorkerSlot, SchedulingError> {
        let started = Instant::now();

        let label_permit = match &self.pools {
            None => None,
            Some(pools) => {
                let timed_out = || SchedulingError::Timeout {
                    label: label.to_string(),
                    waited: self.scheduling_timeout,
                };

                let Some(pool) = pools.get(label).cloned() else {
                    debug!("No runner advertises label '{}'; holding job", label);
                    let err = tokio::select! {
                        _ = tokio::time::sleep(self.scheduling_timeout) => timed_out(),
                        _ = cancel.cancelled() => SchedulingError::Cancelled,
                    };
                    return Err(err);
                };

                tokio::select! {
                    permit = tokio::time::timeout(self.scheduling_timeout, pool.acquire_owned()) => {
                        match permit {
                            Ok(Ok(permit)) => Some(permit),
                            // A closed pool can never serve the job
                            Ok(Err(_)) | Err(_) => return Err(timed_out()),
                        }
                    }
                    _ = cancel.cancelled() => return Err(SchedulingError::Cancelled),
                }
            }
        };

        let global = tokio::select! {
            permit = self.global.clone().acquire_owned() => {
                permit.map_err(|_| SchedulingError::Cancelled)?
            }
            _ = cancel.cancelled() => return Err(SchedulingError::Cancelled),
        };

        debug!(
            "Acquired worker for label '{}' after {:?}",
            label,
            started.elapsed()
        );

        Ok(WorkerSlot {
            _label: label_permit,
            _global: global,
        })
    }
}
