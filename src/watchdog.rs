//! Watchdog loop run by the `taskrun-watchdog` executable.
//!
//! Contract: given (hostPid, childPid), terminate childPid once hostPid
//! disappears. The watchdog also exits on its own once the child is gone,
//! so it never outlives the child it guards.

use crate::process;
use std::thread;
use std::time::{Duration, Instant};

/// How the supervised child ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The child exited while the host was alive.
    ChildExited,
    /// The host vanished; the child stopped after SIGTERM.
    Terminated,
    /// The host vanished; the child ignored SIGTERM and was SIGKILLed.
    Killed,
}

/// Liveness queries and signal delivery used by [`supervise`].
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
    fn parent_pid(&self) -> u32;
    fn signal(&self, pid: u32, signal: libc::c_int);
}

/// Probe backed by the real OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        process::is_alive(pid)
    }

    fn parent_pid(&self) -> u32 {
        process::parent_pid()
    }

    fn signal(&self, pid: u32, signal: libc::c_int) {
        if let Err(e) = process::send_signal(pid, signal) {
            tracing::debug!(pid, signal, error = %e, "watchdog signal failed");
        }
    }
}

/// Timing knobs for [`supervise`].
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll: Duration,
    pub grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(500),
            grace: Duration::from_millis(1000),
        }
    }
}

/// Watch `host` and terminate `child` when it disappears.
pub fn supervise<P: ProcessProbe>(probe: &P, host: u32, child: u32, timing: Timing) -> Outcome {
    loop {
        if !probe.is_alive(child) {
            return Outcome::ChildExited;
        }
        // Reparenting catches a host pid that was already reused.
        if !probe.is_alive(host) || probe.parent_pid() != host {
            tracing::info!(host, child, "host process gone; terminating orphaned child");
            return terminate(probe, child, timing);
        }
        thread::sleep(timing.poll);
    }
}

fn terminate<P: ProcessProbe>(probe: &P, child: u32, timing: Timing) -> Outcome {
    probe.signal(child, libc::SIGTERM);

    let deadline = Instant::now() + timing.grace;
    let step = timing.poll.min(Duration::from_millis(50)).max(Duration::from_millis(1));
    while Instant::now() < deadline {
        if !probe.is_alive(child) {
            return Outcome::Terminated;
        }
        thread::sleep(step);
    }

    if !probe.is_alive(child) {
        return Outcome::Terminated;
    }
    probe.signal(child, libc::SIGKILL);
    Outcome::Killed
}
