//! Conversion of errors into process termination.
//!
//! The library reports misuse and decode failures as [`TaskError`] values.
//! Binaries (and tasks configured with exit-on-failure) come here to turn
//! them into a message on stderr and an exit.

use crate::error::{Result, TaskError};
use std::io::Write;

/// Print `Error: <err>` to stderr and exit with the error's exit code.
pub fn terminate(err: &TaskError) -> ! {
    // process::exit skips destructors, so buffered forwarded output would be lost.
    let _ = std::io::stdout().flush();
    eprintln!("Error: {}", err);
    std::process::exit(err.exit_code())
}

/// Unwrap `result`, terminating the process on error.
pub fn exit_on_error<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => terminate(&err),
    }
}
