// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider trait for LLM backends.

use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::{ChatRequest, ChatResponse, HealthStatus};

/// A chat-completion backend the orchestrator can talk to.
///
/// Implementations perform exactly one attempt per `chat` call; transient
/// retry with backoff is the orchestrator's responsibility.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Returns the provider's name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Sends one chat-completion request and returns the model's reply.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, AgentError>;

    /// Cheap liveness probe used by the health endpoint.
    async fn health_check(&self) -> Result<HealthStatus, AgentError> {
        Ok(HealthStatus::Healthy)
    }
}
