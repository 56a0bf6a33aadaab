//! Test utility functions for pipeline-runner

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_runner::core::{JobStatus, Pipeline, PipelineConfig, RunOutcome, StepOutcome, StepResult};
use pipeline_runner::execution::{CancelSignal, CommandInvocation, CommandRunner};
use pipeline_runner::{PipelineController, RunReport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted behaviour for commands containing a pattern
#[derive(Debug, Clone, Default)]
struct Rule {
    pattern: String,
    exit_code: i32,
    stderr: String,
    delay: Option<Duration>,
    /// Fail this many calls, then succeed
    failures: Option<usize>,
}

/// Command runner that never touches the shell.
///
/// Commands succeed instantly unless a rule matching a substring of the
/// command says otherwise. Tracks every call and the peak number of commands
/// in flight at once.
#[derive(Default)]
pub struct MockRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
    failures_seen: Mutex<HashMap<String, usize>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(&mut self, pattern: &str) -> &mut Rule {
        if let Some(index) = self.rules.iter().position(|r| r.pattern == pattern) {
            return &mut self.rules[index];
        }
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            ..Default::default()
        });
        self.rules.last_mut().unwrap()
    }

    /// Commands containing `pattern` exit with `exit_code`
    pub fn fail(mut self, pattern: &str, exit_code: i32) -> Self {
        self.rule(pattern).exit_code = exit_code;
        self
    }

    pub fn fail_with_stderr(mut self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        let rule = self.rule(pattern);
        rule.exit_code = exit_code;
        rule.stderr = stderr.to_string();
        self
    }

    /// Commands containing `pattern` fail `failures` times, then succeed
    pub fn flaky(mut self, pattern: &str, failures: usize) -> Self {
        self.rule(pattern).failures = Some(failures);
        self
    }

    /// Commands containing `pattern` take `delay` (or until cancelled)
    pub fn delay(mut self, pattern: &str, delay: Duration) -> Self {
        self.rule(pattern).delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every command executed, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Highest number of commands executing at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn exit_code_for(&self, rule: &Rule) -> i32 {
        match rule.failures {
            Some(failures) => {
                let mut seen = self.failures_seen.lock().unwrap();
                let count = seen.entry(rule.pattern.clone()).or_insert(0);
                *count += 1;
                if *count <= failures {
                    1
                } else {
                    0
                }
            }
            None => rule.exit_code,
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn execute(&self, invocation: &CommandInvocation, mut cancel: CancelSignal) -> StepResult {
        self.calls.lock().unwrap().push(invocation.command.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let rule = self
            .rules
            .iter()
            .find(|r| invocation.command.contains(&r.pattern))
            .cloned()
            .unwrap_or_default();

        let mut outcome = StepOutcome::Exited;
        if let Some(delay) = rule.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => outcome = StepOutcome::Cancelled,
            }
        }

        let exit_code = match outcome {
            StepOutcome::Exited => self.exit_code_for(&rule),
            _ => -1,
        };

        self.running.fetch_sub(1, Ordering::SeqCst);

        StepResult {
            command: invocation.command.clone(),
            exit_code,
            stdout: format!("ran {}\n", invocation.command),
            stderr: if exit_code == 0 { String::new() } else { rule.stderr },
            duration_ms: rule.delay.map(|d| d.as_millis() as u64).unwrap_or(0),
            outcome,
        }
    }
}

/// Parse and validate a pipeline
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("valid YAML")
        .to_pipeline()
        .expect("valid graph")
}

/// Controller for `yaml` driven by `runner`
pub fn controller(yaml: &str, runner: Arc<MockRunner>) -> PipelineController<Arc<MockRunner>> {
    PipelineController::new(pipeline_from_yaml(yaml), runner)
}

/// Run a pipeline with a mock runner
pub async fn run_with_mock(yaml: &str, runner: Arc<MockRunner>) -> RunReport {
    tokio::time::timeout(Duration::from_secs(10), controller(yaml, runner).run())
        .await
        .expect("run should finish")
}

/// Assert a job reached `expected`
pub fn assert_status(report: &RunReport, job_id: &str, expected: JobStatus) {
    let actual = report.status(job_id);
    assert_eq!(
        actual,
        Some(expected),
        "job '{}' should be {:?}, got {:?}",
        job_id,
        expected,
        actual
    );
}

pub fn assert_outcome(report: &RunReport, expected: RunOutcome) {
    assert_eq!(report.outcome, expected, "unexpected run outcome");
}

/// Assert a job never started
pub fn assert_never_ran(report: &RunReport, job_id: &str) {
    let job = report.job(job_id).expect("job in report");
    assert_eq!(job.attempts, 0, "job '{}' should not have run", job_id);
    assert!(job.started_at.is_none());
    assert!(job.steps.is_empty());
}

/// Assert every job that ran started no earlier than its dependencies finished
pub fn assert_dependencies_finished_first(report: &RunReport, pipeline: &Pipeline) {
    for job in pipeline.graph.jobs() {
        let Some(started) = report.job(&job.id).and_then(|j| j.started_at) else {
            continue;
        };
        for dep in &job.dependencies {
            let finished = report
                .job(dep)
                .and_then(|j| j.finished_at)
                .expect("dependency should be finished");
            assert!(
                started >= finished,
                "job '{}' started before dependency '{}' finished",
                job.id,
                dep
            );
        }
    }
}
