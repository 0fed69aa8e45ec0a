//! CLI argument parsing for taskrun.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// taskrun: launch commands and pipelines without leaving orphaned children.
///
/// Pipelines are built from explicit `--pipe` stages; no shell grammar
/// (redirection, globbing, subshells) is interpreted.
#[derive(Parser, Debug)]
#[command(name = "taskrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML settings file (defaults to $TASKRUN_CONFIG, then built-in defaults).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for taskrun.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command, optionally piped into further stages.
    ///
    /// Exits with the first stage's exit code.
    Run(RunArgs),

    /// Print the pipeline that `run` would launch, without launching it.
    Describe(RunArgs),
}

/// Arguments shared by `run` and `describe`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Working directory for every stage.
    #[arg(short = 'C', long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Environment variable added to every stage.
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Terminate as soon as any stage exits nonzero.
    #[arg(long)]
    pub exit_on_failure: bool,

    /// Capture output and print it after the run instead of streaming it.
    #[arg(long, conflicts_with = "async_run")]
    pub capture: bool,

    /// Launch asynchronously and wait for the completion callback.
    #[arg(long = "async")]
    pub async_run: bool,

    /// Additional pipeline stage, split with shell word rules.
    #[arg(long = "pipe", value_name = "STAGE")]
    pub pipes: Vec<String>,

    /// Command and arguments of the first stage.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
