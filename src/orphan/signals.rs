//! Signal trap for the orphan guard.
//!
//! The installed handler only writes the signal number into a nonblocking
//! pipe. A dedicated thread reads the pipe and, in normal context, fans the
//! signal out to every tracked child before restoring the default
//! disposition for that signal.

use super::registry::ChildRegistry;
use crate::process::send_signal;
use std::io::{self, ErrorKind, PipeReader, Read};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

/// Termination-style signals intercepted and forwarded to tracked children.
///
/// SIGKILL cannot be caught; installing it fails and is skipped, which is
/// what the watchdog exists for.
pub const FORWARDED_SIGNALS: [libc::c_int; 7] = [
    libc::SIGHUP,
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGABRT,
    libc::SIGKILL,
    libc::SIGALRM,
    libc::SIGTERM,
];

/// Write end of the notification pipe, -1 until installed.
static NOTIFY_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn post_signal(signal: libc::c_int) {
    let fd = NOTIFY_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let saved = errno_location().map(|errno| {
        // SAFETY: the pointer is this thread's errno slot.
        unsafe { *errno }
    });
    let byte = signal as u8;
    // SAFETY: write(2) is async-signal-safe; a full pipe drops the signal.
    unsafe {
        libc::write(fd, (&byte as *const u8).cast(), 1);
    }
    if let (Some(errno), Some(value)) = (errno_location(), saved) {
        // SAFETY: as above.
        unsafe { *errno = value };
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn errno_location() -> Option<*mut libc::c_int> {
    // SAFETY: always returns the calling thread's errno.
    Some(unsafe { libc::__errno_location() })
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn errno_location() -> Option<*mut libc::c_int> {
    // SAFETY: always returns the calling thread's errno.
    Some(unsafe { libc::__error() })
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn errno_location() -> Option<*mut libc::c_int> {
    None
}

/// Install the trap. Must be called at most once per process.
///
/// Ignores SIGPIPE process-wide: broken pipes surface as write errors and
/// are handled by the pipe forwarder instead.
pub(crate) fn install(registry: Arc<ChildRegistry>) -> io::Result<()> {
    let (reader, writer) = io::pipe()?;
    set_nonblocking(writer.as_raw_fd())?;

    thread::Builder::new()
        .name("taskrun-signals".to_string())
        .spawn(move || forward_loop(reader, &registry))?;

    // The write end lives for the rest of the process.
    NOTIFY_FD.store(writer.into_raw_fd(), Ordering::SeqCst);

    set_disposition(libc::SIGPIPE, libc::SIG_IGN)?;

    let handler = post_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in FORWARDED_SIGNALS {
        if let Err(e) = set_disposition(signal, handler) {
            tracing::debug!(signal, error = %e, "signal cannot be trapped");
        }
    }

    tracing::debug!("orphan guard signal trap installed");
    Ok(())
}

fn forward_loop(mut reader: PipeReader, registry: &ChildRegistry) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for &signal in &buf[..n] {
                    forward(libc::c_int::from(signal), registry);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "signal notification pipe failed");
                break;
            }
        }
    }
}

/// Send `signal` to every tracked child, then restore its default handling.
pub(crate) fn forward(signal: libc::c_int, registry: &ChildRegistry) {
    let pids = registry.pids();
    tracing::debug!(signal, children = pids.len(), "forwarding signal to tracked children");

    for pid in pids {
        if let Err(e) = send_signal(pid, signal) {
            tracing::debug!(signal, pid, error = %e, "failed to forward signal");
        }
    }

    if let Err(e) = set_disposition(signal, libc::SIG_DFL) {
        tracing::warn!(signal, error = %e, "failed to restore default signal handling");
    }
}

fn set_disposition(signal: libc::c_int, handler: libc::sighandler_t) -> io::Result<()> {
    // SAFETY: the sigaction struct is fully initialized before use and the
    // handler, when not SIG_DFL/SIG_IGN, only performs async-signal-safe calls.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
