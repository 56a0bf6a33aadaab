//! Test: runtime-label routing and scheduling timeouts

use crate::helpers::*;
use pipeline_runner::core::{JobStatus, RunOutcome};
use std::time::Duration;

#[tokio::test]
async fn test_label_pool_capacity_bounds_its_jobs() {
    let yaml = r#"
concurrency: 4
runners:
  self-hosted: 1
  default: 4
jobs:
  image-a:
    runs-on: self-hosted
    steps: [{ command: slow build a }]
  image-b:
    runs-on: self-hosted
    steps: [{ command: slow build b }]
  image-c:
    runs-on: self-hosted
    steps: [{ command: slow build c }]
"#;
    let runner = MockRunner::new()
        .delay("slow", Duration::from_millis(40))
        .shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    assert_outcome(&report, RunOutcome::Success);
    assert_eq!(runner.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_jobs_on_different_labels_share_the_global_limit() {
    let yaml = r#"
concurrency: 2
runners:
  linux: 4
  macos: 4
jobs:
  linux-1:
    runtime_label: linux
    steps: [{ command: slow linux 1 }]
  linux-2:
    runtime_label: linux
    steps: [{ command: slow linux 2 }]
  macos-1:
    runtime_label: macos
    steps: [{ command: slow macos 1 }]
  macos-2:
    runtime_label: macos
    steps: [{ command: slow macos 2 }]
"#;
    let runner = MockRunner::new()
        .delay("slow", Duration::from_millis(40))
        .shared();
    let report = run_with_mock(yaml, runner.clone()).await;

    assert_outcome(&report, RunOutcome::Success);
    assert!(runner.peak_concurrency() <= 2);
}

#[tokio::test]
async fn test_unserved_label_fails_with_scheduling_timeout() {
    let yaml = r#"
runners:
  default: 2
jobs:
  prepare:
    steps: [{ command: prepare }]
  train:
    depends_on: [prepare]
    runtime_label: gpu
    steps: [{ command: ./train.sh }]
  evaluate:
    depends_on: [train]
    steps: [{ command: ./evaluate.sh }]
  alert:
    depends_on: [train]
    condition: on-failure
    steps: [{ command: ./alert.sh }]
"#;
    let runner = MockRunner::new().shared();
    let controller =
        controller(yaml, runner.clone()).with_scheduling_timeout(Duration::from_millis(100));
    assert_eq!(controller.plan().unserved_labels, vec!["gpu".to_string()]);

    let report = controller.run().await;

    assert_status(&report, "prepare", JobStatus::Succeeded);
    assert_status(&report, "train", JobStatus::Failed);
    assert_status(&report, "evaluate", JobStatus::Skipped);
    assert_status(&report, "alert", JobStatus::Succeeded);
    assert_outcome(&report, RunOutcome::Failure);

    let train = report.job("train").unwrap();
    assert_eq!(train.attempts, 0);
    assert!(train.steps.is_empty());
    let detail = train.failure_detail().unwrap();
    assert!(detail.contains("gpu"), "unexpected detail: {}", detail);
    assert_eq!(runner.call_count("train.sh"), 0);
}

#[tokio::test]
async fn test_without_runners_every_label_is_served() {
    let yaml = r#"
jobs:
  anywhere:
    runtime_label: some-exotic-label
    steps: [{ command: echo hi }]
"#;
    let runner = MockRunner::new().shared();
    let report = run_with_mock(yaml, runner).await;

    assert_status(&report, "anywhere", JobStatus::Succeeded);
}
