//! Current/draining ownership, dispatch rules, and periodic reaping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use mosaic_sessions::config::GlobalConfig;
use mosaic_sessions::control::drain;
use mosaic_sessions::manager::{Disposition, SessionPlacement};
use mosaic_sessions::models::operation::{OperationKind, OperationParams, MAX_LAYER_COUNT};
use mosaic_sessions::{AppError, SessionLifecycleManager};

use super::test_helpers::{counting_callback, fast_config, gate, wait_until, BlockingJob};

fn manager(config: GlobalConfig) -> SessionLifecycleManager {
    SessionLifecycleManager::new(config, Handle::current())
}

fn load() -> OperationParams {
    OperationParams::LoadSurface {
        surface_id: "bunny".into(),
    }
}

#[tokio::test]
async fn end_without_session_is_rejected_without_mutation() {
    let mut manager = manager(fast_config(1, 0));

    let err = manager.end_session().unwrap_err();

    assert_eq!(err, AppError::NoActiveSession);
    assert!(manager.current_session_id().is_none());
    assert_eq!(manager.draining_count(), 0);
    assert!(manager.is_quiescent());
}

#[tokio::test]
async fn dispatch_without_session_is_rejected() {
    let mut manager = manager(fast_config(1, 0));
    let fired = Arc::new(AtomicUsize::new(0));

    let err = manager
        .dispatch(load(), counting_callback(&fired))
        .unwrap_err();

    assert_eq!(err, AppError::NoActiveSession);
    assert!(manager.is_quiescent());
}

#[tokio::test]
async fn begin_replaces_idle_session_and_destroys_it() {
    let mut manager = manager(fast_config(1, 0));

    let a = manager.begin_session().unwrap();
    let b = manager.begin_session().unwrap();

    assert_ne!(a, b);
    assert_eq!(manager.current_session_id(), Some(b));
    assert_eq!(manager.locate(a), None);
    assert_eq!(manager.locate(b), Some(SessionPlacement::Current));
    assert_eq!(manager.draining_count(), 0);
}

#[tokio::test]
async fn begin_replaces_busy_session_and_parks_it() {
    let mut manager = manager(fast_config(1, 0));
    let fired = Arc::new(AtomicUsize::new(0));
    let gate = gate();

    let a = manager.begin_session().unwrap();
    manager.current_mut().unwrap().launch(
        OperationKind::LoadSurface,
        BlockingJob::new(&gate),
        counting_callback(&fired),
    );
    let b = manager.begin_session().unwrap();

    assert_eq!(manager.current_session_id(), Some(b));
    assert_eq!(manager.locate(a), Some(SessionPlacement::Draining));
    assert_eq!(manager.draining_ids(), vec![a]);

    gate.store(true, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            manager.periodic_sweep();
            manager.locate(a).is_none()
        })
        .await
    );
    assert_eq!(fired.load(Ordering::SeqCst), 0, "discarded session must not call back");
    assert_eq!(manager.current_session_id(), Some(b));
}

#[tokio::test]
async fn ending_busy_session_defers_destruction_until_drained() {
    let mut manager = manager(fast_config(200, 5));
    let fired = Arc::new(AtomicUsize::new(0));

    let id = manager.begin_session().unwrap();
    manager.dispatch(load(), counting_callback(&fired)).unwrap();

    let discarded = manager.end_session().unwrap();
    assert_eq!(discarded.session_id, id);
    assert_eq!(discarded.disposition, Disposition::Draining);
    assert!(manager.current_session_id().is_none());
    assert_eq!(manager.locate(id), Some(SessionPlacement::Draining));

    let destroyed = wait_until(Duration::from_secs(2), || {
        manager.periodic_sweep();
        manager.locate(id).is_none()
    })
    .await;
    assert!(destroyed, "drained session should be destroyed by a sweep");
    assert!(manager.is_quiescent());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn draining_session_survives_sweeps_while_work_runs() {
    let mut manager = manager(fast_config(1, 0));
    let fired = Arc::new(AtomicUsize::new(0));
    let gate = gate();

    let id = manager.begin_session().unwrap();
    manager.current_mut().unwrap().launch(
        OperationKind::UpdateLayers,
        BlockingJob::new(&gate),
        counting_callback(&fired),
    );
    manager.end_session().unwrap();

    for _ in 0..5 {
        let report = manager.periodic_sweep();
        assert!(report.destroyed.is_empty());
        assert_eq!(manager.locate(id), Some(SessionPlacement::Draining));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    gate.store(true, Ordering::SeqCst);
    let mut destroyed = Vec::new();
    assert!(
        wait_until(Duration::from_secs(2), || {
            destroyed.extend(manager.periodic_sweep().destroyed);
            manager.locate(id).is_none()
        })
        .await
    );
    assert_eq!(destroyed, vec![id]);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn draining_session_waits_for_every_pending_operation() {
    let mut manager = manager(fast_config(1, 0));
    let fired = Arc::new(AtomicUsize::new(0));
    let first = gate();
    let second = gate();

    let id = manager.begin_session().unwrap();
    let session = manager.current_mut().unwrap();
    session.launch(
        OperationKind::LoadSurface,
        BlockingJob::new(&first),
        counting_callback(&fired),
    );
    session.launch(
        OperationKind::UpdateLayers,
        BlockingJob::new(&second),
        counting_callback(&fired),
    );
    manager.end_session().unwrap();

    first.store(true, Ordering::SeqCst);
    let mut ready = 0;
    let mut destroyed = Vec::new();
    assert!(
        wait_until(Duration::from_secs(2), || {
            let report = manager.periodic_sweep();
            ready += report.sweep.ready;
            destroyed.extend(report.destroyed);
            ready == 1
        })
        .await
    );
    assert!(destroyed.is_empty());
    assert_eq!(manager.locate(id), Some(SessionPlacement::Draining));
    assert_eq!(manager.periodic_sweep().sweep.pending, 1);

    second.store(true, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            destroyed.extend(manager.periodic_sweep().destroyed);
            manager.locate(id).is_none()
        })
        .await
    );
    for _ in 0..3 {
        destroyed.extend(manager.periodic_sweep().destroyed);
    }
    assert_eq!(destroyed, vec![id]);
    assert!(manager.is_quiescent());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_layer_update_is_rejected_without_launching() {
    let mut manager = manager(fast_config(1, 0));
    let fired = Arc::new(AtomicUsize::new(0));
    manager.begin_session().unwrap();

    let err = manager
        .dispatch(
            OperationParams::UpdateLayers {
                layer_count: u32::MAX,
                thickness_um: 100,
            },
            counting_callback(&fired),
        )
        .unwrap_err();

    assert!(matches!(err, AppError::Protocol(_)));
    assert!(!manager.current().unwrap().has_pending_operations());

    manager
        .dispatch(
            OperationParams::UpdateLayers {
                layer_count: MAX_LAYER_COUNT,
                thickness_um: 100,
            },
            counting_callback(&fired),
        )
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) == 1).await);
    assert_eq!(
        manager.current().unwrap().data().layer_count(),
        2 * MAX_LAYER_COUNT as usize
    );
}

#[tokio::test]
async fn overlapping_operation_is_rejected_and_first_completes_once() {
    let mut manager = manager(fast_config(20, 5));
    let fired = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    manager.begin_session().unwrap();
    manager.dispatch(load(), counting_callback(&fired)).unwrap();

    let err = manager
        .dispatch(load(), counting_callback(&rejected))
        .unwrap_err();
    assert!(matches!(err, AppError::OperationInProgress(ref kind) if kind == "load_surface"));
    assert_eq!(manager.current().unwrap().pending_count(), 1);

    assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) == 1).await);
    assert!(
        wait_until(Duration::from_secs(2), || {
            manager.periodic_sweep();
            !manager.current().unwrap().has_pending_operations()
        })
        .await
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(rejected.load(Ordering::SeqCst), 0);

    // Once reaped, the session accepts the next operation.
    manager
        .dispatch(OperationParams::CreateDesign, counting_callback(&fired))
        .unwrap();
}

#[tokio::test]
async fn full_draining_collection_exhausts_new_sessions() {
    let mut config = fast_config(1, 0);
    config.max_draining_sessions = 1;
    let mut manager = manager(config);
    let fired = Arc::new(AtomicUsize::new(0));
    let gate = gate();

    let a = manager.begin_session().unwrap();
    manager.current_mut().unwrap().launch(
        OperationKind::LoadSurface,
        BlockingJob::new(&gate),
        counting_callback(&fired),
    );

    let err = manager.begin_session().unwrap_err();
    assert!(matches!(err, AppError::ResourceExhausted(_)));
    assert!(manager.current_session_id().is_none());
    assert_eq!(manager.locate(a), Some(SessionPlacement::Draining));

    gate.store(true, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            manager.periodic_sweep();
            manager.draining_count() == 0
        })
        .await
    );
    assert!(manager.begin_session().is_ok());
}

#[tokio::test]
async fn at_most_one_current_across_request_sequences() {
    let mut manager = manager(fast_config(30, 2));
    let fired = Arc::new(AtomicUsize::new(0));
    let script = "bllbebleelbbblebl";

    for (step, command) in script.chars().enumerate() {
        match command {
            'b' => {
                manager.begin_session().unwrap();
            }
            'e' => {
                let _ = manager.end_session();
            }
            _ => {
                let _ = manager.dispatch(load(), counting_callback(&fired));
            }
        }
        if step % 3 == 0 {
            manager.periodic_sweep();
        }

        let draining = manager.draining_ids();
        if let Some(current) = manager.current_session_id() {
            assert!(!draining.contains(&current), "session both current and draining");
        }
        let mut unique = draining.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), draining.len());
    }

    manager.shutdown();
    assert!(drain(&mut manager, Duration::from_secs(2)).await);
    assert!(manager.is_quiescent());
}

#[tokio::test]
async fn shutdown_cancels_and_drains_everything() {
    let mut manager = manager(fast_config(10_000, 5));
    let fired = Arc::new(AtomicUsize::new(0));

    manager.begin_session().unwrap();
    manager.dispatch(load(), counting_callback(&fired)).unwrap();
    manager.begin_session().unwrap();
    manager.dispatch(load(), counting_callback(&fired)).unwrap();
    assert_eq!(manager.draining_count(), 1);

    manager.shutdown();
    assert!(manager.current_session_id().is_none());
    assert!(drain(&mut manager, Duration::from_secs(2)).await);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
