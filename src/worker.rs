//! Cooperative cancellation for long-running units of work.
//!
//! A [`CancellableWorker`] carries one cancellation flag for the lifetime of
//! the session that owns it. Cancellation is monotonic: once requested it is
//! never cleared, and every clone of the worker observes it. Work is driven
//! in bounded [`UnitOfWork::step`]s so the flag is checked between steps.

use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Result of advancing a unit of work by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    /// More steps remain.
    Continue,
    /// The work finished and produced its output.
    Done(T),
}

/// Terminal outcome of [`CancellableWorker::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome<T> {
    /// The work ran to completion.
    Completed(T),
    /// Cancellation was observed at a checkpoint before completion.
    Cancelled,
}

impl<T> WorkOutcome<T> {
    /// Whether the work was cut short by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// An opaque, steppable unit of domain work.
///
/// Each call to [`step`](Self::step) should return within well under a
/// second. Implementations must not publish partial results from `step`;
/// anything externally visible belongs in the final output.
pub trait UnitOfWork: Send + 'static {
    /// Value produced on completion.
    type Output: Send + 'static;

    /// Perform one bounded step of work.
    fn step(&mut self) -> Progress<Self::Output>;
}

/// Executor holding the shared, monotonic cancellation flag.
///
/// Cloning is cheap and every clone shares the same flag, which is how
/// background tasks observe cancellation requested by the control context.
#[derive(Debug, Clone, Default)]
pub struct CancellableWorker {
    cancel: CancellationToken,
}

impl CancellableWorker {
    /// Create a worker whose flag is not yet set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent and non-blocking.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `work` to completion, checking the flag before every step.
    #[must_use]
    pub fn run<W: UnitOfWork>(&self, mut work: W) -> WorkOutcome<W::Output> {
        let mut steps: u64 = 0;
        loop {
            if self.is_cancelled() {
                trace!(steps, "work cancelled at checkpoint");
                return WorkOutcome::Cancelled;
            }
            steps += 1;
            if let Progress::Done(output) = work.step() {
                trace!(steps, "work completed");
                return WorkOutcome::Completed(output);
            }
        }
    }
}
