//! Orphan guard.
//!
//! Keeps launched children from outliving this process:
//! - signals delivered to this process are forwarded to every tracked child
//!   (see [`signals`]);
//! - every child gets a `taskrun-watchdog <hostPid> <childPid>` process that
//!   terminates the child if this process disappears without a chance to
//!   forward anything (for example after SIGKILL).
//!
//! # Lifecycle
//!
//! The process-wide guard is created on first use by [`OrphanGuard::global`].
//! The signal trap is installed lazily, once, on the first launch.

mod registry;
pub mod signals;

pub use registry::ChildRegistry;

use crate::config::Settings;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Once, OnceLock};

/// File name of the watchdog executable.
pub const WATCHDOG_BIN: &str = "taskrun-watchdog";

static GLOBAL: OnceLock<OrphanGuard> = OnceLock::new();

/// Signal forwarding and watchdog spawning for tracked children.
#[derive(Debug)]
pub struct OrphanGuard {
    registry: Arc<ChildRegistry>,
    host_pid: u32,
    trap: Once,
    trap_enabled: bool,
}

impl OrphanGuard {
    /// The process-wide guard.
    pub fn global() -> &'static OrphanGuard {
        GLOBAL.get_or_init(|| Self::build(true))
    }

    /// A guard that tracks children and spawns watchdogs but never touches
    /// signal dispositions. Only the global guard installs the trap.
    pub fn detached() -> Self {
        Self::build(false)
    }

    fn build(trap_enabled: bool) -> Self {
        Self {
            registry: Arc::new(ChildRegistry::new()),
            host_pid: std::process::id(),
            trap: Once::new(),
            trap_enabled,
        }
    }

    pub fn registry(&self) -> &ChildRegistry {
        &self.registry
    }

    pub fn host_pid(&self) -> u32 {
        self.host_pid
    }

    /// Install the signal trap if this is the first launch.
    pub fn arm(&self) {
        if !self.trap_enabled {
            return;
        }
        self.trap.call_once(|| {
            if let Err(e) = signals::install(Arc::clone(&self.registry)) {
                tracing::warn!(error = %e, "failed to install signal forwarding");
            }
        });
    }

    /// Track `pid` and spawn its watchdog.
    pub fn enroll(&self, pid: u32, settings: &Settings) {
        self.arm();

        let watchdog = if settings.watchdog_enabled {
            spawn_watchdog(self.host_pid, pid, settings)
        } else {
            None
        };
        self.registry.insert(pid, watchdog);
        tracing::debug!(pid, tracked = self.registry.len(), "child enrolled in orphan guard");
    }

    /// Stop tracking `pid` after it exited.
    pub fn release(&self, pid: u32) {
        if self.registry.remove(pid) {
            tracing::debug!(pid, tracked = self.registry.len(), "child released from orphan guard");
        }
    }
}

fn spawn_watchdog(host_pid: u32, child_pid: u32, settings: &Settings) -> Option<Child> {
    let program = watchdog_path(settings);
    let spawned = Command::new(&program)
        .arg(host_pid.to_string())
        .arg(child_pid.to_string())
        .arg("--poll-ms")
        .arg(settings.watchdog_poll_ms.to_string())
        .arg("--grace-ms")
        .arg(settings.kill_grace_ms.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // Terminal-generated signals must not take the watchdog down with us.
        .process_group(0)
        .spawn();

    match spawned {
        Ok(child) => {
            tracing::debug!(child = child_pid, watchdog = child.id(), "watchdog spawned");
            Some(child)
        }
        Err(e) => {
            tracing::warn!(
                child = child_pid,
                watchdog = %program.display(),
                error = %e,
                "failed to spawn watchdog; child is protected by signal forwarding only"
            );
            None
        }
    }
}

/// Locate the watchdog executable.
///
/// Order: explicit setting, next to the current executable, one directory up
/// (test binaries live in `target/<profile>/deps`), then a bare name left to
/// PATH lookup.
pub fn watchdog_path(settings: &Settings) -> PathBuf {
    if let Some(path) = &settings.watchdog {
        return path.clone();
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let candidates = [Some(dir), dir.parent()];
        for candidate in candidates.into_iter().flatten() {
            let path = candidate.join(WATCHDOG_BIN);
            if path.is_file() {
                return path;
            }
        }
    }

    PathBuf::from(WATCHDOG_BIN)
}
