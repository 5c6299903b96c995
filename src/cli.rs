// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `devdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devdag",
    version,
    about = "Schedule a plan of dependent development tasks and generate code for each.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Devdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Devdag.toml")]
    pub config: PathBuf,

    /// Plan file (JSON) with the tasks to execute.
    #[arg(long, value_name = "PATH")]
    pub plan: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config and plan, print the tasks, but don't execute.
    #[arg(long)]
    pub dry_run: bool,

    /// Wipe the output directory before running.
    #[arg(long)]
    pub clean: bool,
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
