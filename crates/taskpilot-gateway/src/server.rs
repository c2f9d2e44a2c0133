// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Routes: an unauthenticated /health, and the /api/ai surface behind the
//! JWT middleware.

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use taskpilot_core::AgentError;

use crate::auth::{AuthState, auth_middleware};
use crate::handlers::{self, AppState};

/// Build the full application router.
pub fn router(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/ai/chat", post(handlers::post_chat))
        .route("/api/ai/confirm/{confirmation_id}", post(handlers::post_confirm))
        .route("/api/ai/reject/{confirmation_id}", post(handlers::post_reject))
        .route(
            "/api/ai/pending-confirmations",
            get(handlers::get_pending_confirmations),
        )
        .route("/api/ai/tool-call-log", get(handlers::get_tool_call_log))
        .route("/api/ai/usage-stats", get(handlers::get_usage_stats))
        .route_layer(axum_middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves.
pub async fn start_server(
    host: &str,
    port: u16,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AgentError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AgentError::Internal(format!("gateway server error: {e}")))
}
