#![forbid(unsafe_code)]

//! `mosaic-sessions` — interactive session lifecycle server.
//!
//! Reads one request per line from stdin, writes JSON-line responses to
//! stdout, and logs to stderr. A periodic tick reclaims finished work and
//! destroys drained sessions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use mosaic_sessions::control::run_control_loop;
use mosaic_sessions::protocol::USAGE;
use mosaic_sessions::{AppError, GlobalConfig, Result, SessionLifecycleManager};

/// How long the runtime waits for detached blocking tasks at exit.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mosaic-sessions", about = "Session lifecycle server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the periodic sweep interval in milliseconds.
    #[arg(long)]
    sweep_interval_ms: Option<u64>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("mosaic-sessions bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::ResourceExhausted(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    // Stdin reads and cancelled work may still occupy blocking threads.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(interval) = args.sweep_interval_ms {
        config.sweep_interval_ms = interval;
        config.validate()?;
    }
    info!(
        sweep_interval_ms = config.sweep_interval_ms,
        max_draining_sessions = config.max_draining_sessions,
        "configuration loaded"
    );

    let manager = SessionLifecycleManager::with_current_runtime(config)?;

    // ── Wire shutdown signal ────────────────────────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_ct.cancel();
    });

    eprintln!("{USAGE}");

    run_control_loop(
        manager,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        ct,
    )
    .await?;

    info!("mosaic-sessions shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
