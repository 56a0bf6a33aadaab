//! CLI output formatting

use crate::{
    controller::ExecutionPlan,
    core::{JobStatus, RunOutcome, StepOutcome},
    execution::ExecutionEvent,
    report::{JobReport, RunReport},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar counting finished jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => style("PENDING").dim().to_string(),
        JobStatus::Ready => style("READY").blue().to_string(),
        JobStatus::Running => style("RUNNING").yellow().to_string(),
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run outcome for display
pub fn format_outcome(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Success => style("SUCCESS").green().bold().to_string(),
        RunOutcome::Failure => style("FAILURE").red().bold().to_string(),
    }
}

fn status_icon(status: JobStatus) -> Emoji<'static, 'static> {
    match status {
        JobStatus::Succeeded => CHECK,
        JobStatus::Failed => CROSS,
        JobStatus::Skipped => SKIP,
        _ => SPINNER,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_jobs,
        } => format!(
            "{} Starting pipeline {} ({}, {} jobs)",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim(),
            total_jobs
        ),
        ExecutionEvent::JobReady { job_id } => {
            format!("{} {} ready", INFO, style(job_id).dim())
        }
        ExecutionEvent::JobStarted { job_id, attempt } => {
            if *attempt > 1 {
                format!(
                    "{} {} (attempt {})",
                    SPINNER,
                    style(job_id).cyan(),
                    style(attempt).dim()
                )
            } else {
                format!("{} {}", SPINNER, style(job_id).cyan())
            }
        }
        ExecutionEvent::StepFinished {
            job_id,
            step,
            exit_code,
            outcome,
            duration_ms,
        } => {
            let result = match outcome {
                StepOutcome::Exited if *exit_code == 0 => style("ok".to_string()).green(),
                StepOutcome::Exited => style(format!("exit {}", exit_code)).red(),
                StepOutcome::TimedOut => style("timed out".to_string()).red(),
                StepOutcome::Cancelled => style("cancelled".to_string()).yellow(),
            };
            format!(
                "   {} {} {} {}",
                style(job_id).dim(),
                step,
                result,
                style(format!("({}ms)", duration_ms)).dim()
            )
        }
        ExecutionEvent::JobRetrying {
            job_id,
            attempt,
            max_retries,
        } => format!(
            "{} {} retrying (attempt {}/{})",
            WARN,
            style(job_id).yellow(),
            attempt,
            max_retries + 1
        ),
        ExecutionEvent::JobFinished { job_id, status } => format!(
            "{} {} {}",
            status_icon(*status),
            style(job_id).bold(),
            format_job_status(*status)
        ),
        ExecutionEvent::JobSkipped { job_id, reason } => format!(
            "{} {} {} {}",
            SKIP,
            style(job_id).bold(),
            format_job_status(JobStatus::Skipped),
            style(format!("({})", reason)).dim()
        ),
        ExecutionEvent::PipelineFinished {
            execution_id,
            outcome,
        } => format!(
            "{} Pipeline ({}) finished: {}",
            INFO,
            style(short_id(execution_id)).dim(),
            format_outcome(*outcome)
        ),
    }
}

fn format_job_line(job: &JobReport) -> String {
    let mut line = format!(
        "  {} {:<20} {}",
        status_icon(job.status),
        job.id,
        format_job_status(job.status)
    );
    if job.attempts > 1 {
        line.push_str(&format!(" {}", style(format!("after {} attempts", job.attempts)).dim()));
    }
    if job.status == JobStatus::Skipped {
        if let Some(reason) = &job.reason {
            line.push_str(&format!(" {}", style(format!("({})", reason)).dim()));
        }
    }
    line
}

/// Human-readable final report: every job, plus failure details
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{} {} ({})\n",
        style("Pipeline").bold(),
        style(&report.pipeline_name).bold(),
        style(short_id(&report.execution_id)).dim()
    ));

    for job in &report.jobs {
        out.push_str(&format_job_line(job));
        out.push('\n');
    }

    for job in report.failed_jobs() {
        out.push_str(&format!("\n{} {} failed", CROSS, style(&job.id).red().bold()));
        if let Some(step) = job.failed_step() {
            out.push_str(&format!(" at `{}`", step.command));
        }
        out.push('\n');
        if let Some(detail) = job.failure_detail() {
            for line in detail.lines() {
                out.push_str(&format!("    {}\n", style(line).dim()));
            }
        }
    }

    let duration = report
        .duration_ms()
        .map(|ms| format!(" in {:.1}s", ms as f64 / 1000.0))
        .unwrap_or_default();
    out.push_str(&format!(
        "\n{} {} succeeded, {} failed, {} skipped{}\n",
        format_outcome(report.outcome),
        report.count(JobStatus::Succeeded),
        report.count(JobStatus::Failed),
        report.count(JobStatus::Skipped),
        duration
    ));
    out
}

/// Human-readable dry-run plan
pub fn format_plan(plan: &ExecutionPlan) -> String {
    let mut out = format!(
        "{} Plan for {} (concurrency {})\n",
        INFO,
        style(&plan.pipeline_name).bold(),
        plan.concurrency
    );

    for (index, wave) in plan.waves.iter().enumerate() {
        out.push_str(&format!("\n{}\n", style(format!("Wave {}", index + 1)).cyan()));
        for job in wave {
            let deps = if job.depends_on.is_empty() {
                String::new()
            } else {
                format!(" after {}", job.depends_on.join(", "))
            };
            out.push_str(&format!(
                "  {}{} [{}] ({})\n",
                style(&job.id).bold(),
                style(deps).dim(),
                job.runtime_label,
                serde_yaml::to_string(&job.condition)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            ));
            for step in &job.steps {
                out.push_str(&format!("    $ {}\n", step));
            }
        }
    }

    for label in &plan.unserved_labels {
        out.push_str(&format!(
            "\n{} no runner advertises label '{}'\n",
            WARN, label
        ));
    }
    out
}
