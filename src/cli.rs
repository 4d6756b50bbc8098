// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagspec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagspec",
    version,
    about = "Compile a pipeline job and run its tasks in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Pipeline job document (JSON).
    #[arg(long, value_name = "PATH")]
    pub job: PathBuf,

    /// Engine config (TOML).
    ///
    /// Default: `Dagspec.toml` in the current directory if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGSPEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Compile and print the execution plan, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the recorded task outputs here (JSON) when the run ends.
    #[arg(long, value_name = "PATH")]
    pub outputs: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
