// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Taskpilot todo assistant.

use thiserror::Error;

/// The primary error type used across all Taskpilot services.
///
/// Each variant maps to a stable machine-readable code via [`AgentError::error_code`],
/// which is what API clients and audit records see.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, malformed response, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Command processing errors: invalid input, model-call failure after retries.
    #[error("processing error: {0}")]
    Processing(String),

    /// Per-user context could not be reconstructed.
    #[error("context retrieval error: {0}")]
    ContextRetrieval(String),

    /// A tool invocation failed in a way the normalized result shape cannot carry.
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// The model requested a tool that is not in the catalog.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool parameters failed validation before dispatch.
    #[error("invalid tool parameters: {0}")]
    InvalidParameters(String),

    /// Caller identity is invalid or does not own the addressed resource.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No pending confirmation exists with the given id.
    #[error("confirmation not found: {0}")]
    ConfirmationNotFound(String),

    /// The confirmation exists but is not in the pending state.
    #[error("confirmation not pending: {0}")]
    ConfirmationNotPending(String),

    /// The confirmation's TTL has elapsed; it behaves as absent afterwards.
    #[error("confirmation expired: {0}")]
    ConfirmationExpired(String),

    /// The audit trail could not be written.
    #[error("audit logging error: {0}")]
    AuditLogging(String),

    /// The service is shutting down and not accepting commands.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Stable machine-readable code exposed in API error bodies and audit records.
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::Storage { .. } => "DATABASE_ERROR",
            AgentError::Provider { .. } => "PROVIDER_ERROR",
            AgentError::Processing(_) => "AI_PROCESSING_ERROR",
            AgentError::ContextRetrieval(_) => "CONTEXT_RETRIEVAL_ERROR",
            AgentError::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            AgentError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            AgentError::InvalidParameters(_) => "INVALID_TOOL_PARAMETERS",
            AgentError::PermissionDenied(_) => "USER_PERMISSION_ERROR",
            AgentError::ConfirmationNotFound(_)
            | AgentError::ConfirmationNotPending(_)
            | AgentError::ConfirmationExpired(_) => "CONFIRMATION_ERROR",
            AgentError::AuditLogging(_) => "AUDIT_LOGGING_ERROR",
            AgentError::ServiceUnavailable(_) => "AI_SERVICE_UNAVAILABLE",
            AgentError::Internal(_) => "UNEXPECTED_ERROR",
        }
    }
}
