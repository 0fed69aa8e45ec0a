//! Error types for taskrun.
//!
//! Uses thiserror for derive macros. Misuse of a task is reported as an
//! ordinary error value here; turning it into process termination is left to
//! the CLI boundary (see [`crate::fatal`]).

use crate::exit_codes;
use crate::output::Stream;
use std::io;
use thiserror::Error;

/// Main error type for task operations.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A run-family operation was invoked on a task that already ran.
    #[error("task '{command}' has already been run; a task can only be launched once")]
    AlreadyRun { command: String },

    /// A pipe destination was launched directly instead of through its source.
    #[error(
        "task '{command}' is a pipe destination and can only be launched by running the head of its pipeline"
    )]
    PipeDestination { command: String },

    /// `pipe` was asked to build a link that is not a simple path.
    #[error("cannot pipe into '{command}': {reason}")]
    InvalidPipe { command: String, reason: String },

    /// The wrapper process could not be started.
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Pipe creation or process wait failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Captured output was not valid UTF-8.
    #[error("output of '{command}' on {stream} is not valid UTF-8 text")]
    Decode { command: String, stream: Stream },

    /// Nonzero exit of a task configured to terminate the host on failure.
    #[error("command '{command}' failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },

    /// Settings could not be loaded or validated.
    #[error("{0}")]
    Config(String),
}

impl TaskError {
    /// Returns the host exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskError::AlreadyRun { .. } => exit_codes::MISUSE,
            TaskError::PipeDestination { .. } => exit_codes::MISUSE,
            TaskError::InvalidPipe { .. } => exit_codes::MISUSE,
            TaskError::Spawn { .. } => exit_codes::SPAWN_FAILURE,
            TaskError::Io { .. } => exit_codes::SPAWN_FAILURE,
            TaskError::Decode { .. } => exit_codes::DECODE_FAILURE,
            TaskError::CommandFailed { code, .. } => exit_codes::failure_exit_code(*code),
            TaskError::Config(_) => exit_codes::CONFIG_FAILURE,
        }
    }

    /// True for programmer errors (re-running, launching a destination, bad pipes).
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            TaskError::AlreadyRun { .. }
                | TaskError::PipeDestination { .. }
                | TaskError::InvalidPipe { .. }
        )
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        TaskError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;
