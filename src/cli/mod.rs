//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{RunCommand, RunsCommand, ShowCommand, ValidateCommand};
use std::ffi::OsString;

/// Configurable step pipelines over tabular data
#[derive(Debug, Parser, Clone)]
#[command(name = "stepline")]
#[command(version)]
#[command(about = "Run configurable step pipelines over tabular data", long_about = None)]
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

    /// Validate step definitions and pipelines
    Validate(ValidateCommand),

    /// List stored runs
    Runs(RunsCommand),

    /// Show a stored run
    Show(ShowCommand),
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
