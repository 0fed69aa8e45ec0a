//! Task model for taskrun.
//!
//! A [`Task`] describes one external command: name, working directory,
//! arguments, environment, and the output handlers interested in it. Tasks
//! are configured fluently and run at most once:
//!
//! ```no_run
//! use taskrun::Task;
//!
//! let grep = Task::new("grep").args(["-v", "^#"]);
//! let code = Task::new("cat")
//!     .args(["/etc/hosts"])
//!     .pipe(grep)
//!     .run(true)?;
//! # Ok::<(), taskrun::TaskError>(())
//! ```
//!
//! `Task` is a cheap handle: clones refer to the same task, so a caller may
//! keep a handle to a pipe destination and observe that it cannot be
//! launched directly.

mod launch;
mod pipe;


pub use launch::CapturedOutput;

use crate::config::Settings;
use crate::output::{DataHandler, Stream};
use pipe::TaskIo;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mutable configuration and run state of a task.
pub(crate) struct TaskState {
    pub(crate) name: String,
    pub(crate) dir: Option<PathBuf>,
    pub(crate) args: Vec<String>,
    pub(crate) env: BTreeMap<String, String>,
    /// Pipe-aware handlers; moved to the destination at launch.
    pub(crate) handlers: Vec<DataHandler>,
    /// Pipe-exempt handlers; always fed this task's own output.
    pub(crate) raw_handlers: Vec<DataHandler>,
    pub(crate) exit_on_failure: bool,
    pub(crate) has_run: bool,
    pub(crate) is_destination: bool,
    pub(crate) destination: Option<Task>,
    /// A rejected `pipe` call, reported by the next run.
    pub(crate) pipe_error: Option<(String, String)>,
    pub(crate) settings: Arc<Settings>,
}

/// A configured, at-most-once-runnable external command.
#[derive(Clone)]
pub struct Task {
    state: Arc<Mutex<TaskState>>,
    io: Arc<TaskIo>,
}

impl Task {
    /// Configure a command, resolved through PATH at launch.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Configure a command that runs in `dir`.
    pub fn with_dir(name: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self::build(name.into(), Some(dir.as_ref().to_path_buf()))
    }

    fn build(name: String, dir: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TaskState {
                name,
                dir,
                args: Vec::new(),
                env: BTreeMap::new(),
                handlers: Vec::new(),
                raw_handlers: Vec::new(),
                exit_on_failure: false,
                has_run: false,
                is_destination: false,
                destination: None,
                pipe_error: None,
                settings: Settings::global(),
            })),
            io: Arc::new(TaskIo::default()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub(crate) fn same_task(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Use `settings` instead of the process-wide defaults.
    pub fn with_settings(self, settings: Arc<Settings>) -> Self {
        self.lock().settings = settings;
        self
    }

    /// Replace the argument list.
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append one argument.
    pub fn arg(self, arg: impl Into<String>) -> Self {
        self.lock().args.push(arg.into());
        self
    }

    /// Replace the environment mapping.
    ///
    /// These variables are added to the inherited environment of the host.
    pub fn env<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.lock().env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set one environment variable.
    pub fn env_var(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.lock().env.insert(key.into(), value.into());
        self
    }

    /// Terminate the host program if this command exits nonzero.
    pub fn exit_on_failure(self) -> Self {
        self.lock().exit_on_failure = true;
        self
    }

    /// Register a handler for this task's output.
    ///
    /// When the task is piped into another, the handler receives the output
    /// of the final pipeline stage instead.
    pub fn output<F>(self, handler: F) -> Self
    where
        F: Fn(&[u8], Stream) + Send + Sync + 'static,
    {
        self.lock().handlers.push(Arc::new(handler));
        self
    }

    /// Register a handler that always receives this task's own output,
    /// regardless of piping.
    pub fn output_ignoring_pipe<F>(self, handler: F) -> Self
    where
        F: Fn(&[u8], Stream) + Send + Sync + 'static,
    {
        self.lock().raw_handlers.push(Arc::new(handler));
        self
    }

    /// Command name.
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Arguments as configured.
    pub fn arguments(&self) -> Vec<String> {
        self.lock().args.clone()
    }

    /// Environment additions as configured.
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.lock().env.clone()
    }

    /// Working directory, if one was configured.
    pub fn dir(&self) -> Option<PathBuf> {
        self.lock().dir.clone()
    }

    /// OS process id, once launched.
    pub fn pid(&self) -> Option<u32> {
        self.io.pid()
    }

    /// Whether a run-family operation already launched this task.
    pub fn has_run(&self) -> bool {
        self.lock().has_run
    }

    /// Whether this task is waiting to be launched by its pipe source.
    pub fn is_pipe_destination(&self) -> bool {
        self.lock().is_destination
    }

    /// Human-readable description: each stage as a shell-quoted command line,
    /// stages joined with ` | `.
    pub fn description(&self) -> String {
        describe(&self.stages())
    }

    /// This task followed by every task downstream of it.
    pub(crate) fn stages(&self) -> Vec<Task> {
        let mut stages = vec![self.clone()];
        let mut next = self.lock().destination.clone();
        while let Some(task) = next {
            next = task.lock().destination.clone();
            stages.push(task);
        }
        stages
    }

    fn command_line(&self) -> String {
        let state = self.lock();
        shell_words::join(std::iter::once(&state.name).chain(state.args.iter()))
    }
}

pub(crate) fn describe(stages: &[Task]) -> String {
    stages
        .iter()
        .map(Task::command_line)
        .collect::<Vec<_>>()
        .join(" | ")
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Task")
            .field("name", &state.name)
            .field("dir", &state.dir)
            .field("args", &state.args)
            .field("env", &state.env)
            .field("handlers", &state.handlers.len())
            .field("raw_handlers", &state.raw_handlers.len())
            .field("exit_on_failure", &state.exit_on_failure)
            .field("has_run", &state.has_run)
            .field("is_destination", &state.is_destination)
            .field("has_destination", &state.destination.is_some())
            .finish()
    }
}
