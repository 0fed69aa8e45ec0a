//! taskrun: compose and launch external commands the way a shell would.
//!
//! Configure a [`Task`], optionally [`pipe`](Task::pipe) it into further
//! tasks, and run the head of the chain synchronously, asynchronously, or
//! for its captured text output. Every launched child is enrolled in the
//! [`OrphanGuard`], which forwards termination signals received by this
//! process and spawns a watchdog that kills the child should this process
//! die abruptly.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fatal;
pub mod logging;
pub mod orphan;
pub mod output;
pub mod process;
pub mod task;
pub mod termination;
pub mod watchdog;

pub use config::Settings;
pub use error::{Result, TaskError};
pub use orphan::OrphanGuard;
pub use output::{DataHandler, Stream};
pub use task::{CapturedOutput, Task};
