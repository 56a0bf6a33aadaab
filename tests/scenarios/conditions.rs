//! Test: run-conditions on-success / always / on-failure

use crate::helpers::*;
use pipeline_runner::core::{JobStatus, RunOutcome};

const WITH_HANDLERS: &str = r#"
name: handlers
jobs:
  compile:
    steps:
      - command: make all
  notify-failure:
    depends_on: [compile]
    condition: on-failure
    steps:
      - command: ./notify.sh failed
  archive:
    depends_on: [compile]
    condition: always
    steps:
      - command: tar czf logs.tgz logs
  publish:
    depends_on: [compile]
    steps:
      - command: ./publish.sh
"#;

#[tokio::test]
async fn test_on_failure_handler_runs_when_dependency_fails() {
    let runner = MockRunner::new().fail("make", 2).shared();
    let report = run_with_mock(WITH_HANDLERS, runner.clone()).await;

    assert_status(&report, "compile", JobStatus::Failed);
    assert_status(&report, "notify-failure", JobStatus::Succeeded);
    assert_status(&report, "archive", JobStatus::Succeeded);
    assert_status(&report, "publish", JobStatus::Skipped);
    assert_never_ran(&report, "publish");
    assert_outcome(&report, RunOutcome::Failure);
}

#[tokio::test]
async fn test_on_failure_handler_skipped_when_dependency_succeeds() {
    let runner = MockRunner::new().shared();
    let report = run_with_mock(WITH_HANDLERS, runner.clone()).await;

    assert_status(&report, "notify-failure", JobStatus::Skipped);
    assert_eq!(
        report.job("notify-failure").unwrap().reason.as_deref(),
        Some("no dependency failed")
    );
    assert_status(&report, "archive", JobStatus::Succeeded);
    assert_status(&report, "publish", JobStatus::Succeeded);
    assert_eq!(runner.call_count("notify"), 0);

    // A skipped job is not a failure
    assert_outcome(&report, RunOutcome::Success);
}

#[tokio::test]
async fn test_always_runs_when_every_dependency_failed() {
    let yaml = r#"
jobs:
  unit:
    steps:
      - command: run unit
  integration:
    steps:
      - command: run integration
  summary:
    depends_on: [unit, integration]
    condition: always
    steps:
      - command: summarize
"#;
    let runner = MockRunner::new().fail("run ", 1).shared();
    let report = run_with_mock(yaml, runner).await;

    assert_status(&report, "unit", JobStatus::Failed);
    assert_status(&report, "integration", JobStatus::Failed);
    assert_status(&report, "summary", JobStatus::Succeeded);
    assert_dependencies_finished_first(&report, &pipeline_from_yaml(yaml));
}

#[tokio::test]
async fn test_on_failure_ignores_failures_further_upstream() {
    let yaml = r#"
jobs:
  fetch:
    steps:
      - command: git fetch
  build:
    depends_on: [fetch]
    steps:
      - command: cargo build
  rollback:
    depends_on: [build]
    condition: on-failure
    steps:
      - command: ./rollback.sh
"#;
    let runner = MockRunner::new().fail("git fetch", 128).shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    // build never ran, so there is nothing for rollback to undo
    assert_status(&report, "fetch", JobStatus::Failed);
    assert_status(&report, "build", JobStatus::Skipped);
    assert_status(&report, "rollback", JobStatus::Skipped);
    assert_never_ran(&report, "rollback");
    assert_eq!(runner.call_count("rollback"), 0);
    assert_outcome(&report, RunOutcome::Failure);
}

#[tokio::test]
async fn test_skip_propagates_through_long_chain() {
    let yaml = r#"
jobs:
  a:
    steps: [{ command: step-a }]
  b:
    depends_on: [a]
    steps: [{ command: step-b }]
  c:
    depends_on: [b]
    steps: [{ command: step-c }]
  d:
    depends_on: [c]
    steps: [{ command: step-d }]
"#;
    let runner = MockRunner::new().fail("step-a", 1).shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    assert_status(&report, "a", JobStatus::Failed);
    for job in ["b", "c", "d"] {
        assert_status(&report, job, JobStatus::Skipped);
        assert_never_ran(&report, job);
    }
    assert_eq!(runner.calls(), vec!["step-a"]);
}
