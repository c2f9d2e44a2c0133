// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the /api/ai REST surface.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskpilot_agent::{AuditLog, CommandOrchestrator, ConfirmationManager, HistoryFilter};
use taskpilot_core::{AgentError, ToolCallOutcome};
use taskpilot_storage::PendingConfirmation;

use crate::auth::Identity;

/// Default page size for the tool-call log.
const DEFAULT_HISTORY_LIMIT: i64 = 50;
/// Largest accepted page size.
const MAX_HISTORY_LIMIT: i64 = 100;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CommandOrchestrator>,
    pub confirmations: Arc<ConfirmationManager>,
    pub audit: Arc<AuditLog>,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<CommandOrchestrator>) -> Self {
        let confirmations = orchestrator.confirmations();
        let audit = orchestrator.audit();
        Self {
            orchestrator,
            confirmations,
            audit,
            start_time: Instant::now(),
        }
    }
}

fn default_require_confirmation() -> bool {
    true
}

/// Request body for POST /api/ai/chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    /// Natural-language command.
    pub message: String,
    /// Whether destructive operations are deferred behind a confirmation.
    #[serde(default = "default_require_confirmation")]
    pub require_confirmation: bool,
    /// Continue an existing conversation owned by the caller.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response body for POST /api/ai/chat and the confirmation endpoints.
#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub success: bool,
    pub response: String,
    pub tool_calls: Vec<ToolCallOutcome>,
    pub requires_confirmation: bool,
    pub conversation_id: Option<String>,
    /// Human-readable status, distinct from the model's `response` text.
    pub message: String,
}

/// A pending confirmation as exposed over HTTP. Stored parameters are
/// surfaced as JSON rather than the raw stored string.
#[derive(Debug, Serialize)]
pub struct PendingConfirmationView {
    pub id: String,
    pub tool_name: String,
    pub tool_params: Value,
    pub context: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

impl From<PendingConfirmation> for PendingConfirmationView {
    fn from(confirmation: PendingConfirmation) -> Self {
        let tool_params = serde_json::from_str(&confirmation.tool_params)
            .unwrap_or(Value::String(confirmation.tool_params));
        Self {
            id: confirmation.id,
            tool_name: confirmation.tool_name,
            tool_params,
            context: confirmation.context,
            created_at: confirmation.created_at,
            expires_at: confirmation.expires_at,
        }
    }
}

/// Query parameters for GET /api/ai/tool-call-log.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub tool_name: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Query parameters for GET /api/ai/usage-stats.
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error_code: &'static str,
    pub message: String,
}

fn error_status(error: &AgentError) -> StatusCode {
    match error {
        AgentError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        AgentError::ConfirmationNotFound(_) | AgentError::ConfirmationExpired(_) => {
            StatusCode::NOT_FOUND
        }
        AgentError::Processing(_)
        | AgentError::ContextRetrieval(_)
        | AgentError::ToolExecution(_)
        | AgentError::ToolNotFound(_)
        | AgentError::InvalidParameters(_)
        | AgentError::ConfirmationNotPending(_) => StatusCode::BAD_REQUEST,
        AgentError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::Provider { .. } => StatusCode::BAD_GATEWAY,
        AgentError::Config(_)
        | AgentError::Storage { .. }
        | AgentError::AuditLogging(_)
        | AgentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: AgentError) -> Response {
    let status = error_status(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    }
    (
        status,
        Json(ErrorBody {
            success: false,
            error_code: error.error_code(),
            message: error.to_string(),
        }),
    )
        .into_response()
}

/// POST /api/ai/chat
pub async fn post_chat(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    match state
        .orchestrator
        .handle_command_with(
            &user_id,
            &body.message,
            body.require_confirmation,
            body.conversation_id.as_deref(),
        )
        .await
    {
        Ok(outcome) => {
            let message = if outcome.requires_confirmation {
                "Command processed; one or more operations await confirmation."
            } else {
                "Command processed successfully."
            };
            Json(ChatResponseBody {
                success: true,
                response: outcome.response,
                tool_calls: outcome.tool_calls,
                requires_confirmation: outcome.requires_confirmation,
                conversation_id: outcome.conversation_id,
                message: message.to_string(),
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /api/ai/confirm/{confirmation_id}
pub async fn post_confirm(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Path(confirmation_id): Path<String>,
) -> Response {
    match state
        .orchestrator
        .execute_confirmed(&user_id, &confirmation_id)
        .await
    {
        Ok(outcome) => Json(ChatResponseBody {
            success: true,
            response: outcome.response,
            tool_calls: outcome.tool_calls,
            requires_confirmation: false,
            conversation_id: None,
            message: "Confirmed operation executed.".to_string(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/ai/reject/{confirmation_id}
pub async fn post_reject(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Path(confirmation_id): Path<String>,
) -> Response {
    match state
        .orchestrator
        .reject_confirmation(&user_id, &confirmation_id)
        .await
    {
        Ok(confirmation) => Json(serde_json::json!({
            "success": true,
            "confirmation_id": confirmation.id,
            "status": "rejected",
            "tool_name": confirmation.tool_name,
            "message": format!("Operation '{}' was rejected.", confirmation.tool_name),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/ai/pending-confirmations
pub async fn get_pending_confirmations(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
) -> Response {
    match state.orchestrator.list_pending(&user_id).await {
        Ok(pending) => {
            let pending: Vec<PendingConfirmationView> =
                pending.into_iter().map(Into::into).collect();
            let count = pending.len();
            Json(serde_json::json!({
                "success": true,
                "user_id": user_id,
                "pending_confirmations": pending,
                "count": count,
                "message": format!("{count} pending confirmation(s)"),
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /api/ai/tool-call-log
pub async fn get_tool_call_log(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit < 1 || limit > MAX_HISTORY_LIMIT {
        return error_response(AgentError::InvalidParameters(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return error_response(AgentError::InvalidParameters(
            "offset must not be negative".to_string(),
        ));
    }

    let filter = HistoryFilter {
        tool_name: query.tool_name,
        status: query.status,
        start: query.start_date,
        end: query.end_date,
    };
    match state
        .audit
        .history(&user_id, filter.clone(), limit, offset)
        .await
    {
        Ok((logs, total)) => {
            let has_more = offset + (logs.len() as i64) < total;
            Json(serde_json::json!({
                "success": true,
                "user_id": user_id,
                "logs": logs,
                "pagination": {
                    "limit": limit,
                    "offset": offset,
                    "total": total,
                    "has_more": has_more,
                },
                "filters": {
                    "tool_name": filter.tool_name,
                    "status": filter.status,
                    "start_date": filter.start,
                    "end_date": filter.end,
                },
                "message": format!("{} log record(s)", logs.len()),
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /api/ai/usage-stats
pub async fn get_usage_stats(
    State(state): State<AppState>,
    Extension(Identity(user_id)): Extension<Identity>,
    Query(query): Query<StatsQuery>,
) -> Response {
    match state
        .audit
        .usage_stats(&user_id, query.start_date, query.end_date)
        .await
    {
        Ok(stats) => Json(serde_json::json!({
            "success": true,
            "user_id": user_id,
            "stats": stats,
            "message": "usage statistics computed",
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
    .into_response()
}
