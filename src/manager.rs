//! Current-session ownership and deferred destruction of discarded sessions.
//!
//! The [`SessionLifecycleManager`] holds at most one current [`Session`] and
//! a bounded collection of discarded sessions that are still draining. A
//! discarded session with nothing pending is dropped on the spot; otherwise
//! it is cancelled and kept until [`periodic_sweep`](SessionLifecycleManager::periodic_sweep)
//! finds it empty. That sweep is the only place draining sessions are
//! destroyed.

use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::models::operation::OperationParams;
use crate::pending::SweepSummary;
use crate::session::{CompletionCallback, Session};
use crate::{AppError, Result};

/// Where a live session is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPlacement {
    /// The session receiving requests.
    Current,
    /// Discarded and waiting for its operations to finish.
    Draining,
}

/// What [`SessionLifecycleManager`] did with a discarded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Nothing was pending; the session was dropped.
    Destroyed,
    /// Operations were pending; the session was cancelled and parked.
    Draining,
}

/// A session removed from the current slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Discarded {
    /// The discarded session.
    pub session_id: Uuid,
    /// Whether it was destroyed or parked.
    pub disposition: Disposition,
}

/// Result of one periodic sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Aggregate handle counts across all swept sessions.
    pub sweep: SweepSummary,
    /// Draining sessions destroyed by this tick.
    pub destroyed: Vec<Uuid>,
}

/// Owner of the current session and of every session still draining.
#[derive(Debug)]
pub struct SessionLifecycleManager {
    config: GlobalConfig,
    runtime: Handle,
    current: Option<Session>,
    draining: Vec<Session>,
}

impl SessionLifecycleManager {
    /// Create a manager whose sessions run work on `runtime`.
    #[must_use]
    pub fn new(config: GlobalConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            current: None,
            draining: Vec::new(),
        }
    }

    /// Create a manager bound to the ambient tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceExhausted` when called outside a runtime.
    pub fn with_current_runtime(config: GlobalConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| AppError::ResourceExhausted(format!("no tokio runtime: {err}")))?;
        Ok(Self::new(config, runtime))
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Start a new session, discarding the current one first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceExhausted` when the draining collection
    /// is full. The previous session is discarded regardless and no new
    /// session becomes current.
    pub fn begin_session(&mut self) -> Result<Uuid> {
        let span = info_span!("begin_session");
        let _guard = span.enter();

        if let Some(previous) = self.current.take() {
            let discarded = self.discard(previous);
            info!(
                session_id = %discarded.session_id,
                disposition = ?discarded.disposition,
                "previous session discarded"
            );
        }

        if self.draining.len() >= self.config.max_draining_sessions {
            warn!(
                draining = self.draining.len(),
                limit = self.config.max_draining_sessions,
                "refusing new session while draining collection is full"
            );
            return Err(AppError::ResourceExhausted(format!(
                "{} sessions still draining",
                self.draining.len()
            )));
        }

        let session = Session::new(self.config.work.clone(), self.runtime.clone());
        let id = session.id();
        self.current = Some(session);
        info!(session_id = %id, "session started");
        Ok(id)
    }

    /// Discard the current session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoActiveSession` when there is no current session;
    /// no state changes in that case.
    pub fn end_session(&mut self) -> Result<Discarded> {
        let span = info_span!("end_session");
        let _guard = span.enter();

        let session = self.current.take().ok_or(AppError::NoActiveSession)?;
        let discarded = self.discard(session);
        info!(
            session_id = %discarded.session_id,
            disposition = ?discarded.disposition,
            "session stopped"
        );
        Ok(discarded)
    }

    /// Route an operation request to the current session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` for out-of-range parameters,
    /// `AppError::NoActiveSession` when there is no current session, or
    /// `AppError::OperationInProgress` when the operation is exclusive and
    /// the session still has one pending. None of these mutates any state.
    pub fn dispatch(
        &mut self,
        params: OperationParams,
        on_complete: CompletionCallback,
    ) -> Result<Uuid> {
        params.validate()?;
        let kind = params.kind();
        let session = self.current.as_mut().ok_or(AppError::NoActiveSession)?;

        if kind.requires_exclusivity() && session.has_pending_operations() {
            warn!(session_id = %session.id(), %kind, "rejected overlapping operation");
            return Err(AppError::OperationInProgress(kind.to_string()));
        }

        Ok(session.launch_operation(params, on_complete))
    }

    /// Reap finished operations everywhere and destroy drained sessions.
    pub fn periodic_sweep(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if let Some(session) = self.current.as_mut() {
            report.sweep.absorb(session.sweep());
        }

        let (sweep, destroyed) = self.sweep_draining();
        report.sweep.absorb(sweep);
        report.destroyed = destroyed;
        report
    }

    /// Discard the current session and cancel everything still draining.
    ///
    /// Callers keep ticking [`periodic_sweep`](Self::periodic_sweep) until
    /// [`is_quiescent`](Self::is_quiescent).
    pub fn shutdown(&mut self) {
        if let Some(session) = self.current.take() {
            self.discard(session);
        }
        for session in &self.draining {
            session.request_cancel();
        }
        info!(draining = self.draining.len(), "session manager shutting down");
    }

    /// True when there is no current session and nothing is draining.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.current.is_none() && self.draining.is_empty()
    }

    /// The current session, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Mutable access to the current session, if any.
    ///
    /// Launching through this bypasses the exclusivity check in
    /// [`dispatch`](Self::dispatch).
    pub fn current_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    /// Identifier of the current session, if any.
    #[must_use]
    pub fn current_session_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(Session::id)
    }

    /// Identifiers of draining sessions.
    #[must_use]
    pub fn draining_ids(&self) -> Vec<Uuid> {
        self.draining.iter().map(Session::id).collect()
    }

    /// Number of draining sessions.
    #[must_use]
    pub fn draining_count(&self) -> usize {
        self.draining.len()
    }

    /// Where a session lives, or `None` once it has been destroyed.
    #[must_use]
    pub fn locate(&self, session_id: Uuid) -> Option<SessionPlacement> {
        if self.current_session_id() == Some(session_id) {
            Some(SessionPlacement::Current)
        } else if self.draining.iter().any(|s| s.id() == session_id) {
            Some(SessionPlacement::Draining)
        } else {
            None
        }
    }

    fn discard(&mut self, session: Session) -> Discarded {
        let session_id = session.id();
        let disposition = if session.has_pending_operations() {
            session.request_cancel();
            info!(%session_id, pending = session.pending_count(), "session parked to drain");
            self.draining.push(session);
            Disposition::Draining
        } else {
            drop(session);
            Disposition::Destroyed
        };
        Discarded {
            session_id,
            disposition,
        }
    }

    fn sweep_draining(&mut self) -> (SweepSummary, Vec<Uuid>) {
        let mut summary = SweepSummary::default();
        let mut destroyed = Vec::new();

        self.draining.retain_mut(|session| {
            summary.absorb(session.sweep());
            if session.has_pending_operations() {
                true
            } else {
                destroyed.push(session.id());
                false
            }
        });

        if !destroyed.is_empty() {
            info!(
                destroyed = destroyed.len(),
                draining = self.draining.len(),
                "drained sessions destroyed"
            );
        }
        (summary, destroyed)
    }
}
