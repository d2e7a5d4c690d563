//! Tracking and non-blocking reaping of launched background operations.
//!
//! Every operation a session launches is registered here as a
//! [`PendingOperation`] until a [`sweep`](PendingOperations::sweep) observes
//! it as ready or invalid. Sweeping never waits on a background task: a
//! handle whose completion cannot be confirmed immediately stays pending.

use futures_util::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::operation::OperationKind;

/// Classification of a handle at sweep time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    /// The background task is still running.
    Pending,
    /// The background task has returned.
    Ready,
    /// The task never materialised or ended abnormally; safe to drop.
    Invalid,
}

/// One launched unit of work and its completion signal.
#[derive(Debug)]
pub struct PendingOperation {
    id: Uuid,
    kind: OperationKind,
    handle: Option<JoinHandle<()>>,
    resolved: Option<HandleStatus>,
}

impl PendingOperation {
    /// Wrap the join handle of a spawned background task.
    #[must_use]
    pub fn new(id: Uuid, kind: OperationKind, handle: JoinHandle<()>) -> Self {
        Self {
            id,
            kind,
            handle: Some(handle),
            resolved: None,
        }
    }

    /// A handle with no task behind it.
    #[must_use]
    pub fn detached(id: Uuid, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            handle: None,
            resolved: None,
        }
    }

    /// Operation identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Classify the handle without blocking.
    ///
    /// Once a handle resolves to ready or invalid the result is cached; the
    /// join handle is consumed exactly once.
    pub fn poll_status(&mut self) -> HandleStatus {
        if let Some(status) = self.resolved {
            return status;
        }

        let Some(handle) = self.handle.as_mut() else {
            self.resolved = Some(HandleStatus::Invalid);
            return HandleStatus::Invalid;
        };

        if !handle.is_finished() {
            return HandleStatus::Pending;
        }

        let status = match handle.now_or_never() {
            None => return HandleStatus::Pending,
            Some(Ok(())) => HandleStatus::Ready,
            Some(Err(err)) => {
                warn!(operation_id = %self.id, kind = %self.kind, %err, "background task ended abnormally");
                HandleStatus::Invalid
            }
        };
        self.handle = None;
        self.resolved = Some(status);
        status
    }
}

/// Counts produced by a sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Handles removed because their task finished.
    pub ready: usize,
    /// Handles removed because they were invalid.
    pub invalid: usize,
    /// Handles kept because their task is still running.
    pub pending: usize,
}

impl SweepSummary {
    /// Number of handles removed by the pass.
    #[must_use]
    pub fn reaped(&self) -> usize {
        self.ready + self.invalid
    }

    /// Fold another summary into this one.
    pub fn absorb(&mut self, other: SweepSummary) {
        self.ready += other.ready;
        self.invalid += other.invalid;
        self.pending += other.pending;
    }
}

/// Ordered set of a session's outstanding operations.
///
/// Mutation requires `&mut self`, so inserts and sweeps are mutually
/// exclusive by construction; callers sharing a set across control
/// contexts must wrap it in a lock.
#[derive(Debug, Default)]
pub struct PendingOperations {
    operations: Vec<PendingOperation>,
}

impl PendingOperations {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly launched operation.
    pub fn insert(&mut self, operation: PendingOperation) {
        self.operations.push(operation);
    }

    /// Remove every ready or invalid handle, keeping pending ones in order.
    pub fn sweep(&mut self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        self.operations
            .retain_mut(|operation| match operation.poll_status() {
                HandleStatus::Pending => {
                    debug!(operation_id = %operation.id, "keep pending operation");
                    summary.pending += 1;
                    true
                }
                HandleStatus::Ready => {
                    debug!(operation_id = %operation.id, "erase finished operation");
                    summary.ready += 1;
                    false
                }
                HandleStatus::Invalid => {
                    warn!(operation_id = %operation.id, "erase invalid operation");
                    summary.invalid += 1;
                    false
                }
            });
        summary
    }

    /// Whether no handles remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of handles currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Identifiers in sweep traversal order.
    #[must_use]
    pub fn ids(&self) -> Vec<Uuid> {
        self.operations.iter().map(PendingOperation::id).collect()
    }
}
