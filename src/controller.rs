//! Pipeline controller - turns a configuration into a finished run

use crate::{
    core::{ConfigError, Pipeline, PipelineConfig, Run},
    execution::{
        AbortHandle, CommandRunner, ExecutionEngine, ExecutionEvent, ExecutionScheduler,
        JobExecutor, ShellRunner,
    },
    report::RunReport,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Concurrency used when neither the command line nor the configuration sets one
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One wave of a dry-run plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedJob {
    pub id: String,
    pub depends_on: Vec<String>,
    pub condition: crate::core::RunCondition,
    pub runtime_label: String,
    pub steps: Vec<String>,
}

/// What a run would do, without doing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub pipeline_name: String,
    pub concurrency: usize,

    /// Jobs grouped into waves; each wave only depends on earlier ones
    pub waves: Vec<Vec<PlannedJob>>,

    /// Labels no runner advertises
    pub unserved_labels: Vec<String>,
}

/// Builds runs for a pipeline and drives them to completion
pub struct PipelineController<R = ShellRunner> {
    pipeline: Pipeline,
    runner: Arc<R>,
    concurrency: usize,
    scheduling_timeout: Option<Duration>,
    abort: AbortHandle,
    event_handlers: Vec<crate::execution::EventHandler>,
}

impl PipelineController<ShellRunner> {
    /// Load, validate and prepare a pipeline file to run through the shell
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = PipelineConfig::from_file(path)?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.to_pipeline()?, ShellRunner::new()))
    }
}

impl<R: CommandRunner + 'static> PipelineController<R> {
    pub fn new(pipeline: Pipeline, runner: R) -> Self {
        let concurrency = pipeline.concurrency.unwrap_or_else(default_concurrency);
        Self {
            pipeline,
            runner: Arc::new(runner),
            concurrency,
            scheduling_timeout: None,
            abort: AbortHandle::new(),
            event_handlers: Vec::new(),
        }
    }

    /// Swap the command runner, keeping every other setting
    pub fn with_runner<T: CommandRunner + 'static>(self, runner: T) -> PipelineController<T> {
        PipelineController {
            pipeline: self.pipeline,
            runner: Arc::new(runner),
            concurrency: self.concurrency,
            scheduling_timeout: self.scheduling_timeout,
            abort: self.abort,
            event_handlers: self.event_handlers,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_scheduling_timeout(mut self, timeout: Duration) -> Self {
        self.scheduling_timeout = Some(timeout);
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pipeline.variables.insert(key.into(), value.into());
        self
    }

    /// Add an event handler, called for every event of every run
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Handle that aborts the current run; clones share the signal
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Dry run: the validated waves, nothing executed
    pub fn plan(&self) -> ExecutionPlan {
        let graph = &self.pipeline.graph;
        let waves = graph
            .levels()
            .into_iter()
            .map(|wave| {
                wave.iter()
                    .filter_map(|id| graph.job(id))
                    .map(|job| PlannedJob {
                        id: job.id.clone(),
                        depends_on: job.dependencies.clone(),
                        condition: job.condition,
                        runtime_label: job.runtime_label.clone(),
                        steps: job
                            .steps
                            .iter()
                            .map(|step| step.render_command(&self.pipeline.variables))
                            .collect(),
                    })
                    .collect()
            })
            .collect();

        ExecutionPlan {
            pipeline_name: self.pipeline.name.clone(),
            concurrency: self.concurrency,
            waves,
            unserved_labels: self.pipeline.unserved_labels(),
        }
    }

    fn engine(&self) -> ExecutionEngine<Arc<R>> {
        let mut scheduler = ExecutionScheduler::for_pipeline(&self.pipeline, self.concurrency);
        if let Some(timeout) = self.scheduling_timeout {
            scheduler = scheduler.with_scheduling_timeout(timeout);
        }

        let executor =
            JobExecutor::new(self.runner.clone()).with_variables(self.pipeline.variables.clone());
        let engine = ExecutionEngine::new(executor, scheduler);
        for handler in &self.event_handlers {
            let handler = handler.clone();
            engine.add_event_handler(move |event| handler(event));
        }
        engine
    }

    /// Execute every job and report the outcome
    pub async fn run(&self) -> RunReport {
        let run = Arc::new(Run::new(&self.pipeline.name, self.pipeline.graph.job_ids()));
        debug!("Created run {} for {}", run.execution_id, self.pipeline.name);

        self.engine()
            .execute(&self.pipeline, run.clone(), self.abort.signal())
            .await;

        RunReport::from_run(&run, self.pipeline.execution_order())
    }
}
