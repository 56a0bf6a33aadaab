//! Test: aborting a run

use crate::helpers::*;
use pipeline_runner::core::{JobStatus, RunOutcome};
use std::time::{Duration, Instant};

const LONG_RUN: &str = r#"
jobs:
  quick:
    steps: [{ command: quick }]
  long:
    depends_on: [quick]
    steps:
      - command: slow soak test
      - command: never reached
  after:
    depends_on: [long]
    condition: always
    steps: [{ command: after }]
"#;

#[tokio::test]
async fn test_abort_skips_running_and_waiting_jobs() {
    let runner = MockRunner::new()
        .delay("slow", Duration::from_secs(30))
        .shared();
    let controller = controller(LONG_RUN, runner.clone());
    let abort = controller.abort_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        abort.abort();
    });

    let started = Instant::now();
    let report = tokio::time::timeout(Duration::from_secs(5), controller.run())
        .await
        .expect("abort should end the run");
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_status(&report, "quick", JobStatus::Succeeded);
    assert_status(&report, "long", JobStatus::Skipped);
    assert_status(&report, "after", JobStatus::Skipped);
    assert_eq!(report.job("long").unwrap().reason.as_deref(), Some("cancelled"));
    assert_eq!(report.job("after").unwrap().reason.as_deref(), Some("cancelled"));

    // Cancelled is not a failure
    assert_outcome(&report, RunOutcome::Success);
    assert_eq!(runner.call_count("never reached"), 0);
    assert_eq!(runner.call_count("after"), 0);
}

#[tokio::test]
async fn test_abort_before_run_skips_everything() {
    let runner = MockRunner::new().shared();
    let controller = controller(LONG_RUN, runner.clone());
    controller.abort_handle().abort();

    let report = controller.run().await;

    for job in ["quick", "long", "after"] {
        assert_status(&report, job, JobStatus::Skipped);
        assert_never_ran(&report, job);
    }
    assert!(runner.calls().is_empty());
}
