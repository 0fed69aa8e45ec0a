//! taskrun: launch commands and pipelines from the command line.
//!
//! This is the main entry point for the `taskrun` CLI. It parses arguments,
//! dispatches to the command handler, and converts errors into messages and
//! exit codes. This is the only place where library errors end the process.

mod cli;
mod commands;

use cli::Cli;
use std::process::ExitCode;
use taskrun::{exit_codes, fatal};

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(e) = taskrun::logging::init(cli.verbose, cli.json_logs) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    // Errors print `Error: <message>` and exit with the error's code.
    let code = fatal::exit_on_error(commands::dispatch(cli));
    ExitCode::from(exit_byte(code))
}

fn exit_byte(code: i32) -> u8 {
    if code == exit_codes::SUCCESS {
        0
    } else {
        exit_codes::failure_exit_code(code) as u8
    }
}
