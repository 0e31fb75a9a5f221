//! Latency measurement shared by all phases.
//!
//! A [`Timer`] brackets one blocking operation and, when stopped, emits a single line
//! `<label>,<milliseconds>` on the [`LATENCY_TARGET`] tracing target. Records are not retained or
//! aggregated; the logging setup routes that target to stdout.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Tracing target carrying latency records.
pub const LATENCY_TARGET: &str = "docbench::latency";

/// The measured duration of one labelled operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatencyRecord {
    /// Name of the operation, often including the key or email it worked on.
    pub label: String,
    /// Wall-clock time between start and stop.
    pub duration: Duration,
}

impl fmt::Display for LatencyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.label, self.duration.as_millis())
    }
}

/// A running measurement.
#[derive(Debug)]
#[must_use = "a timer only emits a record when stopped"]
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    /// Starts measuring an operation.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    /// Stops the measurement and emits its record.
    pub fn stop(self) -> LatencyRecord {
        let record = LatencyRecord {
            label: self.label,
            duration: self.start.elapsed(),
        };
        tracing::info!(target: LATENCY_TARGET, "{record}");
        record
    }
}

/// Awaits `future` and emits the time it took under `label`.
pub async fn timed<F: Future>(label: impl Into<String>, future: F) -> F::Output {
    let timer = Timer::start(label);
    let output = future.await;
    timer.stop();
    output
}
