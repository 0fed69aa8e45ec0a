//! Launcher settings for taskrun.
//!
//! Settings control how commands are wrapped and how the orphan guard finds
//! and drives the watchdog. They can be read from a YAML file (unknown fields
//! are ignored) and overridden through `TASKRUN_*` environment variables.

mod model;
mod operations;

#[cfg(test)]
mod tests;

pub use model::Settings;
pub use operations::{CONFIG_ENV, NO_WATCHDOG_ENV, WATCHDOG_ENV, WRAPPER_ENV};
