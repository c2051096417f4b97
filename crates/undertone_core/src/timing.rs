//! Timing spans for attempts and requests.
//!
//! Built on `tokio::time::Instant`, so paused-clock tests observe the
//! simulated durations.

use tokio::time::Instant;
use tracing::trace;

/// Measures one labelled stretch of work
#[derive(Debug)]
pub struct PerfSpan {
    label: &'static str,
    start: Instant,
}

impl PerfSpan {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Elapsed milliseconds, logged at trace level
    pub fn end(self) -> u64 {
        let ms = self.elapsed_ms();
        trace!(label = self.label, elapsed_ms = ms, "span");
        ms
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}
