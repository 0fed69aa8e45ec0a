//! Pipe chain builder and per-task pipe endpoints.
//!
//! `a.pipe(b)` appends `b` at the tail of `a`'s chain and registers, on the
//! old tail, a pipe-exempt handler that copies every stdout chunk into `b`'s
//! stdin and closes it on the terminal empty chunk.

use super::Task;
use crate::output::{DataHandler, Stream};
use crate::process::send_signal;
use std::io::{self, ErrorKind, PipeReader, PipeWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Stdin pipe of a task, created on first use by either side.
#[derive(Default)]
struct StdinPipe {
    created: bool,
    reader: Option<PipeReader>,
    writer: Option<Arc<PipeWriter>>,
}

impl StdinPipe {
    fn ensure(&mut self) -> io::Result<()> {
        if !self.created {
            let (reader, writer) = io::pipe()?;
            self.reader = Some(reader);
            self.writer = Some(Arc::new(writer));
            self.created = true;
        }
        Ok(())
    }
}

/// OS-level endpoints of a task shared with the handlers that feed it.
#[derive(Default)]
pub(crate) struct TaskIo {
    stdin: Mutex<StdinPipe>,
    pid: OnceLock<u32>,
}

impl TaskIo {
    fn stdin(&self) -> MutexGuard<'_, StdinPipe> {
        self.stdin.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Read end of stdin, for wiring into the child. Available once.
    pub(crate) fn take_stdin_reader(&self) -> io::Result<Option<PipeReader>> {
        let mut stdin = self.stdin();
        stdin.ensure()?;
        Ok(stdin.reader.take())
    }

    /// Write `chunk` into stdin without holding the lock during the write.
    pub(crate) fn write_stdin(&self, chunk: &[u8]) -> io::Result<()> {
        let writer = {
            let mut stdin = self.stdin();
            stdin.ensure()?;
            stdin.writer.clone()
        };
        match writer {
            Some(writer) => (&*writer).write_all(chunk),
            None => Err(io::Error::new(ErrorKind::BrokenPipe, "stdin already closed")),
        }
    }

    /// Close the write end, signalling EOF to the reader.
    pub(crate) fn close_stdin(&self) {
        let mut stdin = self.stdin();
        // Create first so a later launch never sees an open, orphaned writer.
        if let Err(e) = stdin.ensure() {
            tracing::warn!(error = %e, "failed to create stdin pipe");
        }
        stdin.writer = None;
    }

    pub(crate) fn set_pid(&self, pid: u32) {
        let _ = self.pid.set(pid);
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }
}

impl Task {
    /// Pipe this task's stdout into `to`'s stdin.
    ///
    /// If this task already has a destination, `to` is appended at the end of
    /// the chain, so pipeline order follows call order. Returns the receiver.
    ///
    /// Links that would not form a simple path (piping into a task that is
    /// already a destination, already ran, or already belongs to this chain)
    /// are rejected; the rejection is reported by the next run of this task.
    pub fn pipe(self, to: Task) -> Self {
        if let Err(reason) = self.link(&to) {
            tracing::debug!(command = %to.name(), reason = %reason, "pipe rejected");
            let name = to.name();
            let mut state = self.lock();
            if state.pipe_error.is_none() {
                state.pipe_error = Some((name, reason));
            }
        }
        self
    }

    fn link(&self, to: &Task) -> Result<(), String> {
        let chain = self.stages();
        let incoming = to.stages();
        if incoming
            .iter()
            .any(|task| chain.iter().any(|member| member.same_task(task)))
        {
            return Err("task is already part of this pipeline".to_string());
        }

        {
            let mut dest = to.lock();
            if dest.is_destination {
                return Err("task is already the destination of another pipe".to_string());
            }
            if dest.has_run {
                return Err("task has already been run".to_string());
            }
            dest.is_destination = true;
        }

        // stages() always contains at least the receiver.
        let tail = chain.last().unwrap_or(self);
        let forwarder = pipe_forwarder(tail, to);
        let mut state = tail.lock();
        state.destination = Some(to.clone());
        state.raw_handlers.push(forwarder);
        Ok(())
    }
}

/// Handler copying `source`'s stdout into `dest`'s stdin.
///
/// Captures only the two tasks' endpoints. A write rejected because the
/// destination closed its read end sends SIGPIPE to the source process and
/// drops the rest of the stream.
fn pipe_forwarder(source: &Task, dest: &Task) -> DataHandler {
    let source_io = Arc::clone(&source.io);
    let dest_io = Arc::clone(&dest.io);
    let dest_name = dest.name();
    let broken = AtomicBool::new(false);

    Arc::new(move |chunk: &[u8], stream: Stream| {
        if stream != Stream::Stdout {
            return;
        }
        if chunk.is_empty() {
            dest_io.close_stdin();
            return;
        }
        if broken.load(Ordering::Relaxed) {
            return;
        }
        match dest_io.write_stdin(chunk) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                broken.store(true, Ordering::Relaxed);
                tracing::debug!(destination = %dest_name, "pipe destination closed its input");
                if let Some(pid) = source_io.pid()
                    && let Err(e) = send_signal(pid, libc::SIGPIPE)
                {
                    tracing::debug!(pid, error = %e, "failed to deliver SIGPIPE");
                }
            }
            Err(e) => {
                broken.store(true, Ordering::Relaxed);
                tracing::warn!(destination = %dest_name, error = %e, "failed to write to pipe");
            }
        }
    })
}
