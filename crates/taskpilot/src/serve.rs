// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `taskpilot serve` and the maintenance subcommands.
//!
//! Wires storage, the Gemini provider, the orchestrator, and the HTTP
//! gateway together, runs the confirmation sweeper in the background, and
//! handles graceful shutdown on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use taskpilot_agent::CommandOrchestrator;
use taskpilot_config::TaskpilotConfig;
use taskpilot_core::AgentError;
use taskpilot_gateway::{AppState, AuthState, encode_token, router, start_server};
use taskpilot_gemini::GeminiProvider;
use taskpilot_storage::Database;

/// How often expired confirmations are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the `taskpilot serve` command.
pub async fn run_serve(config: TaskpilotConfig) -> Result<(), AgentError> {
    init_tracing(&config.agent.log_level);
    info!("starting taskpilot serve");

    if config.server.jwt_secret.is_none() {
        warn!("server.jwt_secret is not set, every API request will be rejected");
    }

    let db = Arc::new(Database::open(&config.storage.database_path).await?);
    let provider = Arc::new(GeminiProvider::from_config(&config.gemini)?);
    let orchestrator = Arc::new(CommandOrchestrator::new(provider, db.clone(), &config));

    // Background sweeper for expired confirmations.
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    {
        let confirmations = orchestrator.confirmations();
        let mut sweeper_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // Skip the first immediate tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = confirmations.sweep_expired().await {
                            warn!(error = %e, "confirmation sweep failed");
                        }
                    }
                    _ = sweeper_rx.changed() => {
                        info!("confirmation sweeper shutting down");
                        break;
                    }
                }
            }
        });
    }

    let app = router(
        AppState::new(orchestrator.clone()),
        AuthState {
            jwt_secret: config.server.jwt_secret.clone(),
        },
    );

    let shutdown_orchestrator = orchestrator.clone();
    let shutdown = async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_orchestrator.shutdown();
        let _ = shutdown_tx.send(true);
    };

    start_server(&config.server.host, config.server.port, app, shutdown).await?;

    // The watch sender lives inside the shutdown future; once the server
    // returns it has fired or been dropped, either of which wakes the sweeper.
    let _ = shutdown_rx.changed().await;
    db.close().await?;
    info!("taskpilot serve shutdown complete");
    Ok(())
}

/// Runs the `taskpilot cleanup` command: one retention pass over the audit
/// trail, then exit.
pub async fn run_cleanup(config: TaskpilotConfig, days: Option<u32>) -> Result<(), AgentError> {
    init_tracing(&config.agent.log_level);

    let retention_days = days.unwrap_or(config.audit.retention_days);
    let db = Arc::new(Database::open(&config.storage.database_path).await?);
    let audit = taskpilot_agent::AuditLog::new(db.clone());

    let mut total = 0usize;
    loop {
        let deleted = audit
            .cleanup(retention_days, config.audit.cleanup_batch)
            .await?;
        total += deleted;
        if deleted < config.audit.cleanup_batch as usize {
            break;
        }
    }
    db.close().await?;
    println!("deleted {total} audit records older than {retention_days} days");
    Ok(())
}

/// Runs the `taskpilot token` command: mint a JWT for local API access.
pub fn run_token(config: &TaskpilotConfig, user: &str, ttl_secs: i64) -> Result<(), AgentError> {
    let Some(ref secret) = config.server.jwt_secret else {
        return Err(AgentError::Config(
            "server.jwt_secret must be set to mint tokens".to_string(),
        ));
    };
    let expires_at = chrono::Utc::now().timestamp() + ttl_secs;
    println!("{}", encode_token(secret.as_bytes(), user, expires_at));
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taskpilot={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
