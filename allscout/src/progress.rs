//! Progress reporting and cooperative cancellation.
//!
//! Progress is a cumulative percentage. File discovery owns 0–10, scanning 10–90 and
//! finalization 90–100.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DISCOVERY_DONE: f64 = 10.0;
pub const SCAN_DONE: f64 = 90.0;
pub const COMPLETE: f64 = 100.0;

/// One progress notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub message: Option<String>,
    /// Cumulative percentage, 0 to 100
    pub increment: Option<f64>,
}

impl ProgressUpdate {
    pub fn at(percent: f64, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            increment: Some(percent.clamp(0.0, COMPLETE)),
        }
    }

    /// Position inside the scanning band after `done` of `total` files
    pub fn scanning(done: usize, total: usize) -> Self {
        Self::at(
            scan_percent(done, total),
            format!("Scanned {}/{} files", done, total),
        )
    }
}

/// Maps `done / total` into the 10–90 band
pub fn scan_percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return SCAN_DONE;
    }
    let fraction = done.min(total) as f64 / total as f64;
    DISCOVERY_DONE + (SCAN_DONE - DISCOVERY_DONE) * fraction
}

/// Receives progress notifications. No acknowledgement is expected.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Polled cancellation flag. Checked between batches, never mid-file.
pub trait CancellationSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancellationSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl CancellationSignal for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
