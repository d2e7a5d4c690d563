//! Shared fixtures for integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mosaic_sessions::config::{GlobalConfig, WorkConfig};
use mosaic_sessions::session::CompletionCallback;
use mosaic_sessions::worker::{Progress, UnitOfWork};

/// Config with short, predictable work.
pub fn fast_config(steps: u32, step_millis: u64) -> GlobalConfig {
    GlobalConfig {
        sweep_interval_ms: 10,
        max_draining_sessions: 8,
        shutdown_grace_ms: 2000,
        work: WorkConfig { steps, step_millis },
    }
}

/// A unit of work whose single step blocks until the gate opens,
/// so cancellation cannot be observed while it is held.
pub struct BlockingJob {
    gate: Arc<AtomicBool>,
}

impl BlockingJob {
    pub fn new(gate: &Arc<AtomicBool>) -> Self {
        Self {
            gate: Arc::clone(gate),
        }
    }
}

impl UnitOfWork for BlockingJob {
    type Output = ();

    fn step(&mut self) -> Progress<Self::Output> {
        while !self.gate.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
        Progress::Done(())
    }
}

/// A unit of work that panics on its first step.
pub struct PanickingJob;

impl UnitOfWork for PanickingJob {
    type Output = ();

    fn step(&mut self) -> Progress<Self::Output> {
        panic!("simulated processing failure");
    }
}

/// Closed gate for [`BlockingJob`].
pub fn gate() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Callback that increments `counter` each time it fires.
pub fn counting_callback(counter: &Arc<AtomicUsize>) -> CompletionCallback {
    let counter = Arc::clone(counter);
    Box::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
