//! Termination coordinator.
//!
//! A task carries one composed termination handler. Each registration wraps
//! the previous handler, so firing the chain runs every callback in
//! registration order, exactly once, with the child's exit code.

/// A one-shot callback receiving a process exit code.
pub type TerminationHandler = Box<dyn FnOnce(i32) + Send + 'static>;

/// Composition of termination callbacks.
#[derive(Default)]
pub struct TerminationChain {
    handler: Option<TerminationHandler>,
    len: usize,
}

impl TerminationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` so it runs after every previously registered one.
    pub fn append<F>(&mut self, callback: F)
    where
        F: FnOnce(i32) + Send + 'static,
    {
        let composed: TerminationHandler = match self.handler.take() {
            Some(previous) => Box::new(move |code| {
                previous(code);
                callback(code);
            }),
            None => Box::new(callback),
        };
        self.handler = Some(composed);
        self.len += 1;
    }

    /// Number of callbacks registered and not yet fired.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Run the composed handler. Later calls are no-ops.
    pub fn fire(&mut self, code: i32) {
        self.len = 0;
        if let Some(handler) = self.handler.take() {
            handler(code);
        }
    }
}

impl std::fmt::Debug for TerminationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationChain")
            .field("len", &self.len)
            .finish()
    }
}
