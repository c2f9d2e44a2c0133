// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization gate: identity format checks and fail-closed ownership.

use std::sync::Arc;

use tracing::warn;

use taskpilot_storage::{Database, queries};

/// Maximum accepted identity length.
const MAX_IDENTITY_LEN: usize = 64;

/// Ownership and identity checks over the task store.
pub struct AuthGate {
    db: Arc<Database>,
}

impl AuthGate {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Validate the identity format: non-empty, bounded, `[A-Za-z0-9_-]` only.
    pub fn validate_identity(user_id: &str) -> bool {
        !user_id.is_empty()
            && user_id.len() <= MAX_IDENTITY_LEN
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// True only when an owner-scoped row exists. A storage failure logs a
    /// warning and denies: the gate fails closed.
    pub async fn owns(&self, user_id: &str, task_id: i64) -> bool {
        match queries::tasks::get_task(&self.db, user_id, task_id).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(user_id, task_id, error = %e, "ownership check failed, denying");
                false
            }
        }
    }
}
