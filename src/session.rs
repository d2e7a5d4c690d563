//! A stateful session and the asynchronous operations it launches.
//!
//! A [`Session`] owns one [`CancellableWorker`], the
//! [`PendingOperations`] it has launched, and its [`SessionData`]. Work runs
//! on the runtime's blocking pool; the session never waits for it. A
//! completion callback fires at most once per operation and never after
//! cancellation has been requested on the session.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::WorkConfig;
use crate::models::operation::{Completion, OperationKind, OperationParams};
use crate::models::surface::SessionData;
use crate::pending::{PendingOperation, PendingOperations, SweepSummary};
use crate::processing::{Commit, MeshJob};
use crate::worker::{CancellableWorker, UnitOfWork, WorkOutcome};

/// Invoked on a background thread when an operation completes uncancelled.
///
/// Receives the session state as it stands after the result was committed,
/// behind a shared read lock.
pub type CompletionCallback = Box<dyn FnOnce(&Completion, &SessionData) + Send + 'static>;

/// One user task: a worker, its pending operations, and the mesh state.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    worker: CancellableWorker,
    pending: PendingOperations,
    data: Arc<RwLock<SessionData>>,
    work: WorkConfig,
    runtime: Handle,
}

impl Session {
    /// Construct a session whose operations run on `runtime`.
    #[must_use]
    pub fn new(work: WorkConfig, runtime: Handle) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            worker: CancellableWorker::new(),
            pending: PendingOperations::new(),
            data: Arc::new(RwLock::new(SessionData::default())),
            work,
            runtime,
        };
        debug!(session_id = %session.id, "session constructed");
        session
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Launch a named mesh operation.
    ///
    /// Returns immediately with the operation identifier. Callers are
    /// expected not to overlap exclusive operations; the session itself
    /// does not check.
    pub fn launch_operation(
        &mut self,
        params: OperationParams,
        on_complete: CompletionCallback,
    ) -> Uuid {
        let kind = params.kind();
        let job = MeshJob::new(params, &self.work);
        self.launch(kind, job, on_complete)
    }

    /// Launch an arbitrary unit of work under this session's worker.
    ///
    /// The result is committed and `on_complete` invoked only when the
    /// cancellation flag is still clear at the completion point, checked
    /// while holding the state write lock. The write lock is released before
    /// `on_complete` runs; the callback holds only a read lock.
    pub fn launch<W>(&mut self, kind: OperationKind, work: W, on_complete: CompletionCallback) -> Uuid
    where
        W: UnitOfWork,
        W::Output: Commit,
    {
        let operation_id = Uuid::new_v4();
        let session_id = self.id;
        let worker = self.worker.clone();
        let data = Arc::clone(&self.data);
        let span = info_span!("operation", %session_id, %operation_id, %kind);

        let handle = self.runtime.spawn_blocking(move || {
            let _guard = span.enter();

            let WorkOutcome::Completed(output) = worker.run(work) else {
                info!("operation cancelled before completion");
                return;
            };

            let completion = {
                let mut state = data.write().unwrap_or_else(PoisonError::into_inner);
                if worker.is_cancelled() {
                    info!("operation finished after cancel request; result discarded");
                    return;
                }
                output.commit(&mut state);
                Completion {
                    session_id,
                    operation_id,
                    kind,
                    completed_at: Utc::now(),
                    state: state.summary(),
                }
            };
            info!("operation completed");

            // Readers in the control context proceed while the callback runs.
            let state = data.read().unwrap_or_else(PoisonError::into_inner);
            on_complete(&completion, &state);
        });

        self.pending
            .insert(PendingOperation::new(operation_id, kind, handle));
        info!(%session_id, %operation_id, %kind, pending = self.pending.len(), "operation launched");
        operation_id
    }

    /// Request cancellation of every running and future operation.
    ///
    /// Pending handles stay registered until a sweep observes them finish.
    pub fn request_cancel(&self) {
        if !self.worker.is_cancelled() {
            info!(session_id = %self.id, pending = self.pending.len(), "session cancel requested");
        }
        self.worker.request_cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.worker.is_cancelled()
    }

    /// Whether any launched operation has not been reaped yet.
    #[must_use]
    pub fn has_pending_operations(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of unreaped operations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Identifiers of unreaped operations in launch order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.pending.ids()
    }

    /// Reap finished and invalid operations without blocking.
    pub fn sweep(&mut self) -> SweepSummary {
        self.pending.sweep()
    }

    /// Read access to the session state.
    ///
    /// Blocks only while a background operation applies its result to the
    /// state. Completion callbacks share read access and never block this.
    #[must_use]
    pub fn data(&self) -> RwLockReadGuard<'_, SessionData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an operation handle directly.
    pub fn track(&mut self, operation: PendingOperation) {
        self.pending.insert(operation);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            info!(session_id = %self.id, "session destroyed");
        } else {
            // Detaches remaining tasks; they only touch the shared state.
            warn!(
                session_id = %self.id,
                pending = self.pending.len(),
                "session destroyed with operations still pending"
            );
            self.worker.request_cancel();
        }
    }
}
