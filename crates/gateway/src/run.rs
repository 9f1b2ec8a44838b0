// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap: wires a validated [`Config`] into a running gateway — tracing,
//! the session manager's background sweep, the HTTP/WebSocket server, and
//! graceful shutdown on SIGTERM/SIGINT.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::attach_token::AttachTokenRegistry;
use crate::audit::AuditSink;
use crate::auth::build_authenticator;
use crate::config::Config;
use crate::manager::{ManagerPolicy, SessionManager};
use crate::transport::build_router;
use crate::transport::state::AppState;

/// Initialize tracing from config. Uses `try_init` so it's safe to call more
/// than once (tests build their own state without going through `run`).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

fn build_audit_sink(config: &Config) -> anyhow::Result<AuditSink> {
    match config.audit_log_path {
        Some(ref path) => AuditSink::to_file(path),
        None => Ok(AuditSink::to_tracing()),
    }
}

/// Build [`AppState`] from a validated config. Split out from [`run`] so
/// integration tests can stand up the same state without binding a socket.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    config.validate()?;
    let authenticator = build_authenticator(&config)?;
    let audit = build_audit_sink(&config)?;

    Ok(AppState {
        manager: Arc::new(SessionManager::new(ManagerPolicy {
            max_sessions_per_user: config.max_sessions_per_user,
            detach_grace: Duration::from_millis(config.detach_grace_ms),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
        })),
        authenticator,
        attach_tokens: Arc::new(AttachTokenRegistry::new(Duration::from_secs(config.attach_token_ttl_secs))),
        audit: Arc::new(audit),
        config: Arc::new(config),
        shutdown: CancellationToken::new(),
    })
}

/// Run the gateway to completion: binds the HTTP listener, spawns the
/// session-sweep and signal-handling tasks, and blocks until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    config.validate()?;

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    let state = build_state(config)?;
    let router = build_router(state.clone());

    {
        let state = state.clone();
        tokio::spawn(async move { state.manager.run_sweep(state.shutdown.clone()).await });
    }

    {
        let sd = state.shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                    info!("received SIGTERM");
                }
                _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                    info!("received SIGINT");
                }
            }
            sd.cancel();

            tokio::select! {
                _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                    info!("received SIGTERM again, forcing exit");
                }
                _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                    info!("received SIGINT again, forcing exit");
                }
            }
            std::process::exit(130);
        });
    }

    let shutdown = state.shutdown.clone();
    let result = axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await;
    if let Err(e) = result {
        error!("HTTP server error: {e}");
    }

    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
