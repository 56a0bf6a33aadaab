//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::{ConfigError, RunOutcome};
use clap::{Parser, Subcommand};
use commands::{ReportCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Exit code for a run that finished with every job succeeded or skipped
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for a run in which at least one job failed
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for configuration and validation errors
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Exit code for a finished run, or a saved report of one
pub fn exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success => EXIT_SUCCESS,
        RunOutcome::Failure => EXIT_FAILURE,
    }
}

/// Exit code for a pipeline that could not be loaded. Every configuration
/// error ends the command before any job runs.
pub fn config_exit_code(error: &ConfigError) -> i32 {
    match error {
        ConfigError::Io { .. }
        | ConfigError::Parse(_)
        | ConfigError::InvalidJob { .. }
        | ConfigError::InvalidSetting { .. }
        | ConfigError::Graph(_) => EXIT_CONFIG_ERROR,
    }
}

/// Dependency-aware pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-runner")]
#[command(version)]
#[command(about = "Runs job graphs described in YAML with bounded concurrency", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Render a saved run report
    Report(ReportCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
