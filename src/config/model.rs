//! Settings struct definition and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings used when launching tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // =========================================================================
    // Process invocation
    // =========================================================================
    /// PATH-resolving wrapper every command is spawned through.
    #[serde(default = "default_wrapper")]
    pub wrapper: String,

    /// Leading `KEY=VALUE` assignment asking the child not to buffer stdio.
    #[serde(default = "default_unbuffered_marker")]
    pub unbuffered_marker: String,

    /// Upper bound, in bytes, of a single multiplexer read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    // =========================================================================
    // Orphan guard
    // =========================================================================
    /// Whether a watchdog process is spawned for every launched child.
    #[serde(default = "default_true")]
    pub watchdog_enabled: bool,

    /// Explicit watchdog executable. Searched for next to the current
    /// executable and then on PATH when unset.
    #[serde(default)]
    pub watchdog: Option<PathBuf>,

    /// How often the watchdog checks host and child liveness.
    #[serde(default = "default_watchdog_poll_ms")]
    pub watchdog_poll_ms: u64,

    /// Delay between SIGTERM and SIGKILL when the watchdog reaps an orphan.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wrapper: default_wrapper(),
            unbuffered_marker: default_unbuffered_marker(),
            read_chunk_size: default_read_chunk_size(),
            watchdog_enabled: true,
            watchdog: None,
            watchdog_poll_ms: default_watchdog_poll_ms(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

pub(crate) fn default_wrapper() -> String {
    "/usr/bin/env".to_string()
}
pub(crate) fn default_unbuffered_marker() -> String {
    "NSUnbufferedIO=YES".to_string()
}
pub(crate) fn default_read_chunk_size() -> usize {
    64 * 1024
}
pub(crate) fn default_watchdog_poll_ms() -> u64 {
    500
}
pub(crate) fn default_kill_grace_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
