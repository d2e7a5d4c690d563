//! The control context: request routing, periodic sweeps, and shutdown drain.
//!
//! A single task owns the [`SessionLifecycleManager`] and multiplexes input
//! lines, sweep ticks, completion responses sent from background threads,
//! and the shutdown token. Nothing here waits on background work.

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::manager::SessionLifecycleManager;
use crate::protocol::{Request, Response, USAGE};
use crate::session::CompletionCallback;
use crate::Result;

/// Channel on which completion callbacks publish their responses.
pub type ResponseSender = mpsc::UnboundedSender<Response>;

/// Apply one request to the manager.
///
/// Returns the immediate response, or `None` when the answer will arrive
/// later on `responses` from the operation's completion callback.
/// [`Request::Quit`] is answered with an acknowledgement; stopping the loop
/// is the caller's job.
pub fn handle_request(
    manager: &mut SessionLifecycleManager,
    request_id: u64,
    request: Request,
    responses: &ResponseSender,
) -> Option<Response> {
    let span = info_span!("request", request_id);
    let _guard = span.enter();

    match request {
        Request::BeginSession => Some(match manager.begin_session() {
            Ok(session_id) => Response::success(
                request_id,
                "session started",
                Some(json!({ "session_id": session_id })),
            ),
            Err(err) => Response::failure(request_id, &err),
        }),
        Request::EndSession => Some(match manager.end_session() {
            Ok(discarded) => {
                Response::success(request_id, "session stopped", Some(json!(discarded)))
            }
            Err(err) => Response::failure(request_id, &err),
        }),
        Request::Operation(params) => {
            let kind = params.kind();
            match manager.dispatch(params, completion_responder(request_id, responses.clone())) {
                Ok(operation_id) => {
                    debug!(%operation_id, %kind, "operation accepted");
                    None
                }
                Err(err) => Some(Response::failure(request_id, &err)),
            }
        }
        Request::Help => Some(Response::success(request_id, USAGE, None)),
        Request::Quit => Some(Response::success(request_id, "bye", None)),
    }
}

fn completion_responder(request_id: u64, responses: ResponseSender) -> CompletionCallback {
    Box::new(move |completion, state| {
        let response = Response::success(
            request_id,
            format!("{} completed", completion.kind),
            Some(json!({ "completion": completion, "state": state })),
        );
        if responses.send(response).is_err() {
            debug!(request_id, "response channel closed; completion dropped");
        }
    })
}

/// Run the control loop until input closes, `q` is read, or `shutdown` fires.
///
/// On exit the manager is shut down and swept until quiescent or the
/// configured grace period elapses; responses produced meanwhile are still
/// written.
///
/// # Errors
///
/// Returns `AppError::Io` if reading input or writing output fails.
pub async fn run_control_loop<R, W>(
    mut manager: SessionLifecycleManager,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut lines = input.lines();
    let mut ticker = tokio::time::interval(manager.config().sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_request_id: u64 = 0;

    async {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let report = manager.periodic_sweep();
                    if report.sweep.reaped() > 0 || !report.destroyed.is_empty() {
                        debug!(
                            reaped = report.sweep.reaped(),
                            pending = report.sweep.pending,
                            destroyed = report.destroyed.len(),
                            "periodic sweep"
                        );
                    }
                }
                Some(response) = rx.recv() => {
                    write_response(&mut output, &response).await?;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("input closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    next_request_id += 1;
                    match Request::parse(&line) {
                        Ok(request) => {
                            let quit = request == Request::Quit;
                            if let Some(response) =
                                handle_request(&mut manager, next_request_id, request, &tx)
                            {
                                write_response(&mut output, &response).await?;
                            }
                            if quit {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(%err, "rejected request");
                            write_response(&mut output, &Response::failure(next_request_id, &err))
                                .await?;
                        }
                    }
                }
            }
        }
        Ok::<(), crate::AppError>(())
    }
    .instrument(info_span!("control_loop"))
    .await?;

    manager.shutdown();
    let grace = manager.config().shutdown_grace();
    drain(&mut manager, grace).await;

    while let Ok(response) = rx.try_recv() {
        write_response(&mut output, &response).await?;
    }
    output.flush().await?;
    Ok(())
}

/// Sweep until the manager is quiescent or `grace` elapses.
///
/// Returns whether quiescence was reached.
pub async fn drain(manager: &mut SessionLifecycleManager, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    let interval = manager.config().sweep_interval();

    loop {
        manager.periodic_sweep();
        if manager.is_quiescent() {
            info!("all sessions drained");
            return true;
        }
        if Instant::now() >= deadline {
            warn!(
                draining = manager.draining_count(),
                "shutdown grace elapsed with sessions still draining"
            );
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, response: &Response) -> Result<()> {
    output.write_all(response.to_line().as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
