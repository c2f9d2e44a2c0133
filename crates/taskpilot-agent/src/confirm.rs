// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable confirmation state machine for destructive operations.
//!
//! Validation order: not found, not pending, permission, expired. The
//! permission check is strict identity equality and does not depend on
//! status. Approval and rejection both consume the row, so a confirmation
//! id is honored at most once; expired rows are deleted on sight and then
//! behave as absent.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use taskpilot_core::AgentError;
use taskpilot_storage::{Database, PendingConfirmation, now_rfc3339, queries};

/// Manages pending destructive-operation confirmations.
pub struct ConfirmationManager {
    db: Arc<Database>,
    ttl: Duration,
}

impl ConfirmationManager {
    pub fn new(db: Arc<Database>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Store a new pending confirmation and return it.
    pub async fn create(
        &self,
        user_id: &str,
        tool_name: &str,
        tool_params: &Value,
        context: Option<String>,
    ) -> Result<PendingConfirmation, AgentError> {
        let now = Utc::now();
        let expires = now + chrono::Duration::from_std(self.ttl).map_err(|e| {
            AgentError::Config(format!("confirmation TTL out of range: {e}"))
        })?;
        let confirmation = PendingConfirmation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tool_name: tool_name.to_string(),
            tool_params: tool_params.to_string(),
            context,
            status: "pending".to_string(),
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            expires_at: expires.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        queries::confirmations::insert(&self.db, confirmation.clone()).await?;
        info!(
            confirmation_id = %confirmation.id,
            user_id,
            tool_name,
            "destructive operation deferred pending confirmation"
        );
        Ok(confirmation)
    }

    /// Run the validation ladder without consuming the row.
    async fn validate(
        &self,
        confirmation_id: &str,
        user_id: &str,
    ) -> Result<PendingConfirmation, AgentError> {
        let confirmation = queries::confirmations::get(&self.db, confirmation_id)
            .await?
            .ok_or_else(|| AgentError::ConfirmationNotFound(confirmation_id.to_string()))?;

        if confirmation.status != "pending" {
            return Err(AgentError::ConfirmationNotPending(
                confirmation_id.to_string(),
            ));
        }
        if confirmation.user_id != user_id {
            return Err(AgentError::PermissionDenied(format!(
                "confirmation {confirmation_id} belongs to another user"
            )));
        }
        if confirmation.expires_at <= now_rfc3339() {
            queries::confirmations::delete(&self.db, confirmation_id).await?;
            debug!(confirmation_id, "expired confirmation removed on access");
            return Err(AgentError::ConfirmationExpired(
                confirmation_id.to_string(),
            ));
        }
        Ok(confirmation)
    }

    /// Validate and consume for execution. The returned record carries the
    /// deferred tool name and parameters; it is already deleted from storage.
    pub async fn approve(
        &self,
        confirmation_id: &str,
        user_id: &str,
    ) -> Result<PendingConfirmation, AgentError> {
        let confirmation = self.validate(confirmation_id, user_id).await?;
        // Consume before execution so a concurrent approve cannot replay it.
        queries::confirmations::delete(&self.db, confirmation_id).await?;
        info!(confirmation_id, user_id, tool_name = %confirmation.tool_name, "confirmation approved");
        Ok(confirmation)
    }

    /// Validate and consume without executing.
    pub async fn reject(
        &self,
        confirmation_id: &str,
        user_id: &str,
    ) -> Result<PendingConfirmation, AgentError> {
        let confirmation = self.validate(confirmation_id, user_id).await?;
        queries::confirmations::delete(&self.db, confirmation_id).await?;
        info!(confirmation_id, user_id, tool_name = %confirmation.tool_name, "confirmation rejected");
        Ok(confirmation)
    }

    /// The caller's unexpired pending confirmations.
    pub async fn list_pending(
        &self,
        user_id: &str,
    ) -> Result<Vec<PendingConfirmation>, AgentError> {
        queries::confirmations::list_pending(&self.db, user_id, &now_rfc3339()).await
    }

    /// Delete every expired confirmation. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<usize, AgentError> {
        let swept = queries::confirmations::delete_expired(&self.db, &now_rfc3339()).await?;
        if swept > 0 {
            info!(swept, "expired confirmations swept");
        }
        Ok(swept)
    }
}
