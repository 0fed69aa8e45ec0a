//! Thin wrappers over the libc process calls used by the launcher, the
//! orphan guard, and the watchdog.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Send `signal` to `pid`.
pub fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if pid <= 0 {
        // 0 and negatives address process groups, never a single child.
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"));
    }
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Whether `pid` names a live (non-zombie) process.
pub fn is_alive(pid: u32) -> bool {
    match send_signal(pid, 0) {
        Ok(()) => !is_zombie(pid),
        // EPERM: exists, owned by someone else.
        Err(e) => e.raw_os_error() == Some(libc::EPERM),
    }
}

/// Parent pid of the calling process.
pub fn parent_pid() -> u32 {
    // SAFETY: getppid always succeeds.
    let ppid = unsafe { libc::getppid() };
    u32::try_from(ppid).unwrap_or(0)
}

/// Exit code of a finished child; `128 + n` when killed by signal `n`.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// Block until `pid` (a child of this process) exits, without reaping it.
///
/// Returns the exit code in the same form as [`exit_code`]. The pid stays
/// reserved as a zombie until the caller reaps it.
pub fn wait_exited(pid: u32) -> io::Result<i32> {
    let id = libc::id_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    loop {
        // SAFETY: siginfo_t is plain data and is only read after waitid
        // filled it in.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                id,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            let status = child_status(&info);
            return Ok(if info.si_code == libc::CLD_EXITED {
                status
            } else {
                128 + status
            });
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn child_status(info: &libc::siginfo_t) -> libc::c_int {
    // SAFETY: waitid stored a SIGCHLD-style record.
    unsafe { info.si_status() }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn child_status(info: &libc::siginfo_t) -> libc::c_int {
    info.si_status
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // Format: "pid (comm) S ..." where comm may itself contain ") ".
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn reaped_child_is_not_alive() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn unreaped_exited_child_counts_as_dead() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(300));
        #[cfg(target_os = "linux")]
        assert!(!is_alive(pid));
        child.wait().unwrap();
    }

    #[test]
    fn signal_zero_pid_rejected() {
        assert!(send_signal(0, 0).is_err());
    }

    #[test]
    fn exit_code_reports_signal_as_128_plus() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        send_signal(child.id(), libc::SIGTERM).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(exit_code(status), 128 + libc::SIGTERM);
    }

    #[test]
    fn exit_code_passes_through_normal_exit() {
        let status = Command::new("sh").args(["-c", "exit 3"]).status().unwrap();
        assert_eq!(exit_code(status), 3);
    }

    #[test]
    fn wait_exited_leaves_child_reapable() {
        let mut child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let pid = child.id();

        assert_eq!(wait_exited(pid).unwrap(), 3);
        // Still a zombie: the pid cannot be recycled yet.
        assert!(send_signal(pid, 0).is_ok());
        assert_eq!(exit_code(child.wait().unwrap()), 3);
    }

    #[test]
    fn wait_exited_reports_signal_as_128_plus() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        send_signal(child.id(), libc::SIGTERM).unwrap();

        assert_eq!(wait_exited(child.id()).unwrap(), 128 + libc::SIGTERM);
        child.wait().unwrap();
    }

    #[test]
    fn wait_exited_on_non_child_fails() {
        assert!(wait_exited(parent_pid()).is_err());
    }

    #[test]
    fn parent_pid_is_nonzero() {
        assert!(parent_pid() > 0);
    }
}
