//! Process launcher.
//!
//! Launching a task starts every stage of its pipeline, head first, each
//! stage spawned right after the previous one (not after it exits). Each
//! stage gets stdout/stderr multiplexers, a termination chain, and orphan
//! guard enrollment. Synchronous runs then wait for the whole chain.

use super::{Task, describe};
use crate::error::{Result, TaskError};
use crate::fatal;
use crate::orphan::OrphanGuard;
use crate::output::{DataHandler, Multiplexer, Stream};
use crate::process::{exit_code, wait_exited};
use crate::termination::TerminationChain;
use std::io::{self, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

/// Exit code and decoded output of [`Task::run_for_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// True when the command exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout lines, without terminators.
    pub fn lines(&self) -> Vec<&str> {
        self.stdout.lines().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Launched by a caller; must be a pipeline head.
    Caller,
    /// Launched as part of its source's launch.
    Piped,
}

/// A started stage waiting to be reaped.
struct Running {
    command: String,
    child: Child,
    termination: TerminationChain,
}

impl Running {
    /// Wait for exit, fire the termination chain, then reap.
    ///
    /// The chain runs while the exited child is still a zombie, so its pid
    /// cannot be recycled before the orphan guard stops tracking it.
    fn wait(mut self) -> Result<i32> {
        let pid = self.child.id();
        let code = match wait_exited(pid) {
            Ok(code) => code,
            Err(e) => {
                tracing::debug!(command = %self.command, pid, error = %e, "waitid failed; reaping first");
                exit_code(self.reap()?)
            }
        };
        tracing::debug!(command = %self.command, code, "process exited");
        self.termination.fire(code);
        self.reap()?;
        Ok(code)
    }

    fn reap(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .map_err(|e| TaskError::io(format!("failed to wait for '{}'", self.command), e))
    }

    /// Kill a stage whose pipeline could not be fully started.
    fn abort(mut self) {
        kill_child(&mut self.child, &self.command);
        if let Err(e) = self.wait() {
            tracing::warn!(error = %e, "failed to reap aborted stage");
        }
    }
}

fn kill_child(child: &mut Child, command: &str) {
    if let Err(e) = child.kill() {
        tracing::debug!(command = %command, error = %e, "kill failed");
    }
}

/// Kill and reap a child that never got a termination chain.
fn discard_child(child: &mut Child, command: &str) {
    kill_child(child, command);
    if let Err(e) = child.wait() {
        tracing::warn!(command = %command, error = %e, "failed to reap discarded stage");
    }
}

impl Task {
    /// Run the task (and its pipeline) to completion.
    ///
    /// With `forward_to_host`, every stage's stderr goes to this process's
    /// stderr and the last stage's stdout to this process's stdout.
    ///
    /// Returns the exit code of this task; a child killed by signal `n`
    /// reports `128 + n`.
    pub fn run(&self, forward_to_host: bool) -> Result<i32> {
        let running = self.start(forward_to_host)?;
        wait_all(running)
    }

    /// Run without forwarding and return the captured output as text.
    ///
    /// For a pipeline the capture is the final stage's output. Output that
    /// is not UTF-8 is an error: this is meant for text-producing commands.
    pub fn run_for_output(&self) -> Result<CapturedOutput> {
        self.check_launchable(Origin::Caller)?;

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let capture: DataHandler = {
            let stdout = Arc::clone(&stdout);
            let stderr = Arc::clone(&stderr);
            Arc::new(move |chunk: &[u8], stream: Stream| {
                let buffer = match stream {
                    Stream::Stdout => &stdout,
                    Stream::Stderr => &stderr,
                };
                buffer
                    .lock()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .extend_from_slice(chunk);
            })
        };
        self.lock().handlers.push(capture);

        let code = self.run(false)?;
        let command = self.description();
        let decode = |buffer: &Mutex<Vec<u8>>, stream: Stream| {
            let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(|p| p.into_inner()));
            String::from_utf8(bytes).map_err(|_| TaskError::Decode {
                command: command.clone(),
                stream,
            })
        };

        Ok(CapturedOutput {
            code,
            stdout: decode(&stdout, Stream::Stdout)?,
            stderr: decode(&stderr, Stream::Stderr)?,
        })
    }

    /// Start the task (and its pipeline) and return immediately.
    ///
    /// `completion` receives this task's exit code on a background thread
    /// once every stage exited and its termination callbacks ran. If the
    /// exit status cannot be collected, `completion` receives -1.
    pub fn run_async<F>(&self, forward_to_host: bool, completion: F) -> Result<()>
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let running = self.start(forward_to_host)?;
        let command = self.description();
        thread::Builder::new()
            .name("taskrun-wait".to_string())
            .spawn(move || {
                let code = wait_all(running).unwrap_or_else(|e| {
                    tracing::error!(command = %command, error = %e, "failed to collect exit status");
                    -1
                });
                completion(code);
            })
            .map_err(|e| TaskError::io("failed to start completion thread", e))?;
        Ok(())
    }

    fn check_launchable(&self, origin: Origin) -> Result<()> {
        let state = self.lock();
        if state.has_run {
            return Err(TaskError::AlreadyRun {
                command: state.name.clone(),
            });
        }
        if origin == Origin::Caller {
            if state.is_destination {
                return Err(TaskError::PipeDestination {
                    command: state.name.clone(),
                });
            }
            if let Some((command, reason)) = &state.pipe_error {
                return Err(TaskError::InvalidPipe {
                    command: command.clone(),
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }

    /// Spawn every stage of the chain headed by this task.
    fn start(&self, forward_to_host: bool) -> Result<Vec<Running>> {
        let stages = self.stages();
        for (i, stage) in stages.iter().enumerate() {
            stage.check_launchable(origin_of(i))?;
        }

        tracing::info!(command = %describe(&stages), "launching");

        let guard = OrphanGuard::global();
        guard.arm();

        let mut running: Vec<Running> = Vec::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            match stage.launch_stage(origin_of(i), stages.get(i + 1), forward_to_host, guard) {
                Ok(stage) => running.push(stage),
                Err(e) => {
                    for started in running.into_iter().rev() {
                        started.abort();
                    }
                    return Err(e);
                }
            }
        }
        Ok(running)
    }

    fn launch_stage(
        &self,
        origin: Origin,
        next: Option<&Task>,
        forward_to_host: bool,
        guard: &'static OrphanGuard,
    ) -> Result<Running> {
        let (name, dir, argv, settings, exit_on_failure, handlers, moved) = {
            let mut state = self.lock();
            state.has_run = true;
            state.is_destination = false;

            if forward_to_host {
                state.raw_handlers.push(host_forwarder(next.is_none()));
            }

            // Consumers of piped output hear from the next stage instead.
            let moved = match next {
                Some(_) => std::mem::take(&mut state.handlers),
                None => Vec::new(),
            };

            let argv = build_argv(
                &state.settings.unbuffered_marker,
                &state.name,
                &state.env,
                &state.args,
            );
            let mut handlers = state.handlers.clone();
            handlers.extend(state.raw_handlers.iter().cloned());
            (
                state.name.clone(),
                state.dir.clone(),
                argv,
                Arc::clone(&state.settings),
                state.exit_on_failure,
                handlers,
                moved,
            )
        };
        if let Some(next) = next {
            next.lock().handlers.extend(moved);
        }

        let stdin = self
            .io
            .take_stdin_reader()
            .map_err(|e| TaskError::io(format!("failed to create stdin pipe for '{}'", name), e))?
            .ok_or_else(|| TaskError::AlreadyRun {
                command: name.clone(),
            })?;

        let mut command = Command::new(&settings.wrapper);
        command
            .args(&argv)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &dir {
            command.current_dir(dir);
        }

        let spawned = command.spawn();
        // Drops the parent's copy of the stdin read end.
        drop(command);
        let mut child = spawned.map_err(|source| TaskError::Spawn {
            command: name.clone(),
            source,
        })?;

        // A head has no source feeding it: its input is empty.
        if origin == Origin::Caller {
            self.io.close_stdin();
        }

        let pid = child.id();
        self.io.set_pid(pid);
        guard.enroll(pid, &settings);
        tracing::debug!(command = %name, pid, "process started");

        let multiplexers = start_multiplexers(&mut child, handlers, settings.read_chunk_size, &name);
        let (stdout_mux, stderr_mux) = match multiplexers {
            Ok(pair) => pair,
            Err(e) => {
                discard_child(&mut child, &name);
                guard.release(pid);
                return Err(TaskError::io(format!("failed to start output readers for '{}'", name), e));
            }
        };

        let mut termination = TerminationChain::new();
        for mut mux in [stdout_mux, stderr_mux].into_iter().flatten() {
            termination.append(move |_| mux.finish());
        }
        if exit_on_failure {
            let command = name.clone();
            termination.append(move |code| {
                if code != 0 {
                    fatal::terminate(&TaskError::CommandFailed { command, code });
                }
            });
        }
        let io = Arc::clone(&self.io);
        termination.append(move |_| io.close_stdin());
        termination.append(move |_| guard.release(pid));

        Ok(Running {
            command: name,
            child,
            termination,
        })
    }
}

fn origin_of(stage: usize) -> Origin {
    if stage == 0 { Origin::Caller } else { Origin::Piped }
}

/// Wait for every stage, last stage first; report the head's exit code.
fn wait_all(running: Vec<Running>) -> Result<i32> {
    let mut head_code = 0;
    let mut first_error = None;
    for (i, stage) in running.into_iter().enumerate().rev() {
        match stage.wait() {
            Ok(code) if i == 0 => head_code = code,
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(head_code),
    }
}

type MultiplexerPair = (Option<Multiplexer>, Option<Multiplexer>);

fn start_multiplexers(
    child: &mut Child,
    handlers: Vec<DataHandler>,
    chunk_size: usize,
    label: &str,
) -> io::Result<MultiplexerPair> {
    let stdout = match child.stdout.take() {
        Some(pipe) => Some(Multiplexer::start(
            Stream::Stdout,
            pipe,
            handlers.clone(),
            chunk_size,
            label,
        )?),
        None => None,
    };
    let stderr = match child.stderr.take() {
        Some(pipe) => Some(Multiplexer::start(
            Stream::Stderr,
            pipe,
            handlers,
            chunk_size,
            label,
        )?),
        None => None,
    };
    Ok((stdout, stderr))
}

/// Arguments passed to the PATH-resolving wrapper:
/// `[marker, KEY=VALUE..., name, args...]`.
pub(crate) fn build_argv(
    marker: &str,
    name: &str,
    env: &std::collections::BTreeMap<String, String>,
    args: &[String],
) -> Vec<String> {
    let mut argv = Vec::with_capacity(2 + env.len() + args.len());
    argv.push(marker.to_string());
    argv.extend(env.iter().map(|(k, v)| format!("{}={}", k, v)));
    argv.push(name.to_string());
    argv.extend(args.iter().cloned());
    argv
}

/// Raw handler copying a stage's output to the host's own streams.
fn host_forwarder(forward_stdout: bool) -> DataHandler {
    Arc::new(move |chunk: &[u8], stream: Stream| {
        if chunk.is_empty() {
            return;
        }
        let result = match stream {
            Stream::Stdout if forward_stdout => {
                let mut out = io::stdout().lock();
                out.write_all(chunk).and_then(|()| out.flush())
            }
            Stream::Stdout => return,
            Stream::Stderr => io::stderr().lock().write_all(chunk),
        };
        if let Err(e) = result {
            tracing::debug!(stream = %stream, error = %e, "failed to forward output to host");
        }
    })
}
