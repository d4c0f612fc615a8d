//! Progress reporting for long-running sweeps.

use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

pub type ProgressError = Box<dyn Error + Send + Sync>;

/// Receives a percentage in `[0, 100]` and a status message.
///
/// Errors and panics raised by a sink are logged and otherwise ignored.
pub trait ProgressSink {
    fn report(&mut self, percent: f64, message: &str) -> Result<(), ProgressError>;
}

impl<F> ProgressSink for F
where
    F: FnMut(f64, &str),
{
    fn report(&mut self, percent: f64, message: &str) -> Result<(), ProgressError> {
        self(percent, message);
        Ok(())
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: f64, _message: &str) -> Result<(), ProgressError> {
        Ok(())
    }
}

/// Counts completed steps and forwards a non-decreasing percentage.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    total: usize,
    done: usize,
    last: f64,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, total: usize) -> Self {
        Self {
            sink,
            total,
            done: 0,
            last: 0.0,
        }
    }

    /// Report the current percentage without advancing.
    pub(crate) fn announce(&mut self, message: &str) {
        let percent = self.last;
        self.send(percent, message);
    }

    /// Mark one step done and report.
    pub(crate) fn step(&mut self, message: &str) {
        self.done = (self.done + 1).min(self.total);
        let percent = if self.total == 0 {
            100.0
        } else {
            100.0 * self.done as f64 / self.total as f64
        };
        self.send(percent.max(self.last), message);
    }

    fn send(&mut self, percent: f64, message: &str) {
        self.last = percent;
        let sink = &mut *self.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| sink.report(percent, message))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, percent, "progress sink failed"),
            Err(_) => warn!(percent, "progress sink panicked"),
        }
    }
}
