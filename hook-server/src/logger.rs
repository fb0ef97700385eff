//! Application-facing request log.
//!
//! The server reports each request's progress through a [`HookLogger`]: one
//! line per arrival, per body received, per event dispatched, and per rejected
//! request. The default [`NoopLogger`] discards everything; [`TracingLogger`]
//! forwards to `tracing` so the lines show up alongside the crate's own
//! diagnostics.

use std::fmt;

/// Sink for the server's request log lines.
pub trait HookLogger: Send + Sync {
    /// Informational line, e.g. `received 120 bytes from 10.0.0.1:5123`.
    fn log(&self, message: &str);

    /// Line describing a rejected request.
    fn error(&self, message: &str);
}

/// Discards every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl HookLogger for NoopLogger {
    fn log(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}

/// Forwards lines to `tracing` at info and error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl HookLogger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "hook_server::requests", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "hook_server::requests", "{message}");
    }
}

impl fmt::Debug for dyn HookLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HookLogger")
    }
}
