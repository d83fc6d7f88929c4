//! Progress reporting
//!
//! Verbose migrations emit a structured `tracing` event at every phase
//! transition; quiet migrations only emit the final result and fatal errors.

use std::fmt::Display;

/// Topic for queue lifecycle events
pub const TOPIC_QUEUE: &str = "Queue operations";

/// Topic for per-document events
pub const TOPIC_DATABASE: &str = "Database operations";

/// Topic for the final outcome
pub const TOPIC_FINAL: &str = "Database operations (final)";

/// Verbosity-gated progress reporter
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    verbose: bool,
}

impl Reporter {
    /// Create reporter
    #[inline]
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Check if progress events are emitted
    #[inline]
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Emit a progress event (verbose only)
    pub fn step(&self, topic: &'static str, message: impl Display) {
        if self.verbose {
            tracing::info!(topic, "{message}");
        }
    }

    /// Emit the final outcome (always)
    pub fn result(&self, topic: &'static str, message: impl Display) {
        tracing::info!(topic, "{message}");
    }

    /// Emit a fatal error (always)
    pub fn fatal(&self, topic: &'static str, error: impl Display) {
        tracing::error!(topic, "{error}");
    }
}
