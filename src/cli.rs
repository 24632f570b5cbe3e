// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdag",
    version,
    about = "Schedule DAG workflows of partitioned jobs onto a cluster.",
    long_about = None
)]
pub struct CliArgs {
    /// Workflow files (TOML). May be given more than once.
    #[arg(long = "workflow", value_name = "PATH", required = true)]
    pub workflows: Vec<String>,

    /// Live instance names for the simulated cluster.
    #[arg(long = "instance", value_name = "NAME", default_values_t = vec!["localhost_0".to_string()])]
    pub instances: Vec<String>,

    /// Stop after this many ticks even if workflows are still running.
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub ticks: u64,

    /// Interval between timer ticks, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 50)]
    pub interval_ms: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAGs, but don't schedule anything.
    #[arg(long)]
    pub dry_run: bool,
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
