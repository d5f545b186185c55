//! CLI command definitions

use crate::notify::LogLevel;
use crate::storage::fs::DEFAULT_PREVIEW_ROWS;
use clap::Args;
use std::path::PathBuf;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the pipeline file (YAML or JSON)
    #[arg(short, long)]
    pub pipeline: String,

    /// Step catalog file; the built-in steps are used when omitted
    #[arg(short, long)]
    pub steps: Option<String>,

    /// Input file, CSV with a header row unless --text is given
    #[arg(short, long)]
    pub input: Option<String>,

    /// Treat the input file as plain text, one item per line
    #[arg(long)]
    pub text: bool,

    /// Directory holding stored runs
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Number of stored runs to keep
    #[arg(long, default_value_t = 10)]
    pub max_runs: usize,

    /// Threads used for item processing
    #[arg(long)]
    pub threads: Option<usize>,

    /// Minimum level of step messages to show
    #[arg(long, value_enum, default_value_t = LogLevelArg::Info)]
    pub log_level: LogLevelArg,
}

/// Validate a step catalog and optionally a pipeline against it
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Step catalog file; the built-in steps are used when omitted
    #[arg(short, long)]
    pub steps: Option<String>,

    /// Pipeline file to check against the catalog
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Output the catalog in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List stored runs
#[derive(Debug, Args, Clone)]
pub struct RunsCommand {
    /// Directory holding stored runs
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show a stored run
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    /// Run id as printed by `run` or `runs`
    pub run_id: String,

    /// Directory holding stored runs
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Number of result rows to print
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub rows: usize,
}

/// Log level argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevelArg {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warning => LogLevel::Warning,
            LogLevelArg::Error => LogLevel::Error,
        }
    }
}
