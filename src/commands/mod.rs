//! Command implementations for taskrun.
//!
//! Routes CLI commands to their implementations. Commands return the exit
//! code the host should exit with; errors are converted to messages and exit
//! codes by `main`.

mod run;

use crate::cli::{Cli, Command};
use std::sync::Arc;
use taskrun::Settings;
use taskrun::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env()?,
    };
    if !Settings::set_global(settings.clone()) {
        tracing::debug!("settings were already initialized");
    }
    let settings = Arc::new(settings);

    match cli.command {
        Command::Run(args) => run::cmd_run(args, settings),
        Command::Describe(args) => run::cmd_describe(args, settings),
    }
}
