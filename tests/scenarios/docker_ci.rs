//! Test: build -> test -> cleanup -> deploy

use crate::helpers::*;
use pipeline_runner::core::{JobStatus, RunOutcome};

const DOCKER_CI: &str = r#"
name: docker-ci
variables:
  IMAGE_NAME: demo-app
  VERSION_TAG: "1.0"
jobs:
  build:
    steps:
      - name: Build image
        run: docker build -t {{ IMAGE_NAME }}:{{ VERSION_TAG }} .
  test:
    needs: [build]
    steps:
      - run: docker run -d --name demo -p 8080:8080 {{ IMAGE_NAME }}:{{ VERSION_TAG }}
      - run: curl -f http://localhost:8080/health
  cleanup:
    needs: [test]
    if: always
    steps:
      - run: docker rm -f demo
  deploy:
    needs: [cleanup]
    steps:
      - run: docker push {{ IMAGE_NAME }}:{{ VERSION_TAG }}
"#;

#[tokio::test]
async fn test_all_jobs_succeed() {
    let runner = MockRunner::new().shared();
    let report = run_with_mock(DOCKER_CI, runner.clone()).await;

    for job in ["build", "test", "cleanup", "deploy"] {
        assert_status(&report, job, JobStatus::Succeeded);
    }
    assert_outcome(&report, RunOutcome::Success);

    assert_eq!(
        runner.calls(),
        vec![
            "docker build -t demo-app:1.0 .",
            "docker run -d --name demo -p 8080:8080 demo-app:1.0",
            "curl -f http://localhost:8080/health",
            "docker rm -f demo",
            "docker push demo-app:1.0",
        ]
    );
    assert_dependencies_finished_first(&report, &pipeline_from_yaml(DOCKER_CI));
}

#[tokio::test]
async fn test_failing_test_still_cleans_up_but_skips_deploy() {
    let runner = MockRunner::new()
        .fail_with_stderr("curl", 22, "curl: (22) The requested URL returned error: 500")
        .shared();
    let report = run_with_mock(DOCKER_CI, runner.clone()).await;

    assert_status(&report, "build", JobStatus::Succeeded);
    assert_status(&report, "test", JobStatus::Failed);
    assert_status(&report, "cleanup", JobStatus::Succeeded);
    assert_status(&report, "deploy", JobStatus::Skipped);
    assert_outcome(&report, RunOutcome::Failure);

    assert_never_ran(&report, "deploy");
    assert_eq!(runner.call_count("docker push"), 0);

    let test = report.job("test").unwrap();
    assert_eq!(test.failed_step().unwrap().exit_code, 22);
    assert!(test.failure_detail().unwrap().contains("returned error: 500"));
}

#[tokio::test]
async fn test_build_failure_short_circuits_everything_but_cleanup() {
    let runner = MockRunner::new().fail("docker build", 1).shared();
    let report = run_with_mock(DOCKER_CI, runner.clone()).await;

    assert_status(&report, "build", JobStatus::Failed);
    assert_status(&report, "test", JobStatus::Skipped);
    assert_status(&report, "cleanup", JobStatus::Succeeded);
    assert_status(&report, "deploy", JobStatus::Skipped);
    assert_outcome(&report, RunOutcome::Failure);

    assert_eq!(
        report.job("test").unwrap().reason.as_deref(),
        Some("dependency 'build' failed")
    );
    assert_eq!(runner.call_count("curl"), 0);
}

#[tokio::test]
async fn test_steps_short_circuit_within_job() {
    let runner = MockRunner::new().fail("docker run", 125).shared();
    let report = run_with_mock(DOCKER_CI, runner.clone()).await;

    assert_status(&report, "test", JobStatus::Failed);
    assert_eq!(report.job("test").unwrap().steps.len(), 1);
    assert_eq!(runner.call_count("curl"), 0);
}

#[tokio::test]
async fn test_report_round_trips_through_json() {
    let runner = MockRunner::new().fail("curl", 7).shared();
    let report = run_with_mock(DOCKER_CI, runner).await;

    let restored = pipeline_runner::RunReport::from_json(&report.to_json().unwrap()).unwrap();
    for job in &report.jobs {
        assert_eq!(restored.status(&job.id), Some(job.status));
        let exit_codes: Vec<i32> = job.steps.iter().map(|s| s.exit_code).collect();
        let restored_codes: Vec<i32> = restored
            .job(&job.id)
            .unwrap()
            .steps
            .iter()
            .map(|s| s.exit_code)
            .collect();
        assert_eq!(exit_codes, restored_codes);
    }
    assert_eq!(restored.outcome, RunOutcome::Failure);
}
