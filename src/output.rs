//! Output multiplexer.
//!
//! One [`Multiplexer`] runs per stream (stdout, stderr) per launched task. A
//! background thread reads whatever bytes are currently available from the
//! pipe and hands them, as one chunk, to every registered handler. End of
//! stream is announced with a single empty chunk.
//!
//! Dispatch and finalization share a per-stream lock, so the terminal empty
//! chunk is delivered exactly once and never interleaves with a late read.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Which standard stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Callback receiving a chunk of output and the stream it came from.
///
/// An empty chunk marks the end of that stream.
pub type DataHandler = Arc<dyn Fn(&[u8], Stream) + Send + Sync + 'static>;

struct StreamState {
    stream: Stream,
    handlers: Vec<DataHandler>,
    finished: Mutex<bool>,
}

impl StreamState {
    fn lock(&self) -> MutexGuard<'_, bool> {
        // A panicking handler must not wedge the stream forever.
        self.finished.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn dispatch(&self, chunk: &[u8]) {
        let finished = self.lock();
        if *finished || chunk.is_empty() {
            return;
        }
        for handler in &self.handlers {
            handler(chunk, self.stream);
        }
    }

    fn finish(&self) {
        let mut finished = self.lock();
        if *finished {
            return;
        }
        *finished = true;
        for handler in &self.handlers {
            handler(&[], self.stream);
        }
    }
}

/// Reader for one stream of one task.
pub struct Multiplexer {
    state: Arc<StreamState>,
    reader: Option<JoinHandle<()>>,
}

impl Multiplexer {
    /// Start reading `source` on a background thread.
    ///
    /// `handlers` is the combined pipe-aware and pipe-exempt list, in that
    /// order. `chunk_size` bounds a single read.
    pub fn start<R>(
        stream: Stream,
        source: R,
        handlers: Vec<DataHandler>,
        chunk_size: usize,
        label: &str,
    ) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let state = Arc::new(StreamState {
            stream,
            handlers,
            finished: Mutex::new(false),
        });

        let thread_state = Arc::clone(&state);
        let reader = thread::Builder::new()
            .name(format!("taskrun-{}-{}", label, stream))
            .spawn(move || read_loop(source, &thread_state, chunk_size))?;

        Ok(Self {
            state,
            reader: Some(reader),
        })
    }

    pub fn stream(&self) -> Stream {
        self.state.stream
    }

    /// Drain the stream to end-of-file and deliver the terminal empty chunk.
    ///
    /// Blocks until every writer of the pipe has closed it. Safe to call more
    /// than once; only the first call delivers anything.
    pub fn finish(&mut self) {
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            tracing::warn!(stream = %self.stream(), "output handler panicked");
        }
        self.state.finish();
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("stream", &self.state.stream)
            .field("handlers", &self.state.handlers.len())
            .field("running", &self.reader.is_some())
            .finish()
    }
}

fn read_loop<R: Read>(mut source: R, state: &StreamState, chunk_size: usize) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => state.dispatch(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(stream = %state.stream, error = %e, "failed to read child output");
                break;
            }
        }
    }
    state.finish();
}
