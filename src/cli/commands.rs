//! CLI command definitions

use crate::{
    controller::PipelineController,
    core::{ConfigError, PipelineConfig},
    report::{ReportError, RunReport},
};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    pub config: PathBuf,

    /// Maximum number of jobs running at once (overrides the file)
    #[arg(short = 'j', long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Validate and print the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Variable overrides (KEY=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Write the final report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the report (or plan) as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    pub config: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Render a saved run report
#[derive(Debug, Args, Clone)]
pub struct ReportCommand {
    /// Path to a report written by `run --report`
    pub path: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    /// Load the pipeline with `--var` and `--concurrency` applied
    pub fn load(&self) -> Result<PipelineController, ConfigError> {
        let controller = load_controller(&self.config, &self.var)?;
        Ok(match self.concurrency {
            Some(n) => controller.with_concurrency(n),
            None => controller,
        })
    }
}

impl ValidateCommand {
    pub fn load(&self) -> Result<PipelineController, ConfigError> {
        load_controller(&self.config, &[])
    }
}

impl ReportCommand {
    pub fn load(&self) -> Result<RunReport, ReportError> {
        RunReport::load(&self.path)
    }
}

fn load_controller(path: &Path, vars: &[(String, String)]) -> Result<PipelineController, ConfigError> {
    let mut config = PipelineConfig::from_file(path)?;
    for (key, value) in vars {
        info!("Variable override: {} = {}", key, value);
        config.set_variable(key.clone(), value.clone());
    }
    PipelineController::from_config(&config)
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid KEY=VALUE pair: {}", s)),
    }
}

fn parse_concurrency(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("Invalid concurrency: {}", s))?;
    if n == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    Ok(n)
}
