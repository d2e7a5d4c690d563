#![forbid(unsafe_code)]

//! Session lifecycle engine for cancellable, long-running mesh operations.
//!
//! A [`SessionLifecycleManager`] owns at most one current [`Session`]. Each
//! session launches work on a [`CancellableWorker`] and tracks it in its
//! [`PendingOperations`]. Replacing or ending a session never blocks: a
//! session with work in flight is cancelled and parked until a periodic
//! sweep observes all of its operations finished.

pub mod config;
pub mod control;
pub mod errors;
pub mod manager;
pub mod models;
pub mod pending;
pub mod processing;
pub mod protocol;
pub mod session;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use manager::SessionLifecycleManager;
pub use pending::PendingOperations;
pub use session::Session;
pub use worker::CancellableWorker;
