//! Test: job-level retries

use crate::helpers::*;
use pipeline_runner::core::{JobStatus, RunOutcome};

#[tokio::test]
async fn test_flaky_job_succeeds_on_retry() {
    let yaml = r#"
jobs:
  checkout:
    steps:
      - command: git clone repo
  integration:
    depends_on: [checkout]
    max_retries: 2
    steps:
      - command: ./prepare.sh
      - command: ./flaky-integration.sh
"#;
    let runner = MockRunner::new().flaky("flaky-integration", 1).shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    assert_status(&report, "integration", JobStatus::Succeeded);
    assert_outcome(&report, RunOutcome::Success);

    let job = report.job("integration").unwrap();
    assert_eq!(job.attempts, 2);
    // Only the final attempt's results are kept
    assert_eq!(job.steps.len(), 2);
    assert!(job.steps.iter().all(|s| s.exit_code == 0));

    // Each attempt restarts from the first step
    assert_eq!(runner.call_count("prepare"), 2);
    assert_eq!(runner.call_count("flaky-integration"), 2);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let yaml = r#"
jobs:
  deploy:
    maxRetries: 2
    steps:
      - command: ./deploy.sh
  verify:
    depends_on: [deploy]
    steps:
      - command: ./verify.sh
"#;
    let runner = MockRunner::new().fail("deploy.sh", 1).shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    assert_status(&report, "deploy", JobStatus::Failed);
    assert_status(&report, "verify", JobStatus::Skipped);
    assert_eq!(report.job("deploy").unwrap().attempts, 3);
    assert_eq!(runner.call_count("deploy.sh"), 3);
}

#[tokio::test]
async fn test_no_retries_by_default() {
    let yaml = r#"
jobs:
  lint:
    steps:
      - command: ruff check
"#;
    let runner = MockRunner::new().flaky("ruff", 1).shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    assert_status(&report, "lint", JobStatus::Failed);
    assert_eq!(report.job("lint").unwrap().attempts, 1);
    assert_eq!(runner.call_count("ruff"), 1);
}

#[tokio::test]
async fn test_pipeline_default_retries_apply_to_jobs() {
    let yaml = r#"
max_retries: 1
jobs:
  lint:
    steps:
      - command: ruff check
  fmt:
    max_retries: 0
    steps:
      - command: ruff format --check
"#;
    let runner = MockRunner::new()
        .flaky("ruff check", 1)
        .flaky("ruff format", 1)
        .shared();
    let report = run_with_mock(yaml, runner).await;

    assert_status(&report, "lint", JobStatus::Succeeded);
    assert_status(&report, "fmt", JobStatus::Failed);
}
