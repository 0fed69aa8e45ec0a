//! Watchdog process: `taskrun-watchdog <hostPid> <childPid>`.
//!
//! Terminates childPid once hostPid disappears; exits on its own when the
//! child is gone.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use taskrun::watchdog::{self, SystemProbe, Timing};

#[derive(Parser, Debug)]
#[command(name = "taskrun-watchdog")]
#[command(version, about = "Kill a child process once its host process disappears")]
struct Args {
    /// Process whose disappearance triggers termination.
    host_pid: u32,

    /// Process to terminate.
    child_pid: u32,

    /// Liveness poll interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    poll_ms: u64,

    /// Delay between SIGTERM and SIGKILL in milliseconds.
    #[arg(long, default_value_t = 1000)]
    grace_ms: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = taskrun::logging::init(false, false) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let timing = Timing {
        poll: Duration::from_millis(args.poll_ms.max(1)),
        grace: Duration::from_millis(args.grace_ms),
    };
    let outcome = watchdog::supervise(&SystemProbe, args.host_pid, args.child_pid, timing);
    tracing::debug!(?outcome, "watchdog finished");
    ExitCode::SUCCESS
}
