use anyhow::{Context, Result};
use pipeline_runner::cli::commands::{ReportCommand, RunCommand, ValidateCommand};
use pipeline_runner::cli::output::*;
use pipeline_runner::cli::{
    config_exit_code, exit_code, Cli, Command, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS,
};
use pipeline_runner::{ConfigError, ExecutionEvent};
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_args();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.verbose).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::Report(cmd) => show_report(cmd),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", CROSS, style(e).red());
            ExitCode::from(EXIT_FAILURE as u8)
        }
    }
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_config_error(e: &ConfigError) {
    eprintln!("{} Invalid pipeline configuration:", CROSS);
    eprintln!("  {}", style(e).red());
}

async fn run_pipeline(cmd: &RunCommand, verbose: bool) -> Result<i32> {
    let controller = match cmd.load() {
        Ok(controller) => controller,
        Err(e) => {
            print_config_error(&e);
            return Ok(config_exit_code(&e));
        }
    };

    if cmd.dry_run {
        let plan = controller.plan();
        if cmd.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print!("{}", format_plan(&plan));
        }
        return Ok(EXIT_SUCCESS);
    }

    let controller = if cmd.json {
        controller
    } else {
        let progress = create_progress_bar(controller.pipeline().graph.len());
        controller.on_event(move |event| {
            match &event {
                ExecutionEvent::JobReady { .. } if !verbose => return,
                ExecutionEvent::JobFinished { .. } | ExecutionEvent::JobSkipped { .. } => {
                    progress.inc(1)
                }
                ExecutionEvent::PipelineFinished { .. } => progress.finish_and_clear(),
                _ => {}
            }
            // println is a no-op on a hidden bar, suspend is not
            progress.suspend(|| println!("{}", format_execution_event(&event)));
        })
    };

    let abort = controller.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling the run");
            abort.abort();
        }
    });

    let report = controller.run().await;

    if let Some(path) = &cmd.report {
        report
            .save(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        if !cmd.json {
            println!("{} Report saved to {}", INFO, style(path.display()).dim());
        }
    }

    if cmd.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", format_report(&report));
    }

    Ok(exit_code(report.outcome))
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    match cmd.load() {
        Ok(controller) => {
            let plan = controller.plan();
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("{} Pipeline configuration is valid!", CHECK);
                println!("  Name: {}", style(&plan.pipeline_name).bold());
                println!("  Jobs: {}", style(controller.pipeline().graph.len()).cyan());
                println!("  Waves: {}", style(plan.waves.len()).cyan());
                println!(
                    "  Variables: {}",
                    style(controller.pipeline().variables.len()).cyan()
                );
                for label in &plan.unserved_labels {
                    println!("{} no runner advertises label '{}'", WARN, label);
                }
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if cmd.json {
                let data = serde_json::json!({ "valid": false, "error": e.to_string() });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_config_error(&e);
            }
            Ok(config_exit_code(&e))
        }
    }
}

fn show_report(cmd: &ReportCommand) -> Result<i32> {
    let report = match cmd.load() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", CROSS, style(e).red());
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    if cmd.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(exit_code(report.outcome))
}

