// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row models for the Taskpilot schema.
//!
//! Enum-valued columns (priority, status) are stored as lowercase TEXT and
//! validated at the service layer; the row structs carry them verbatim.

use serde::{Deserialize, Serialize};

/// A todo task owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Field changes for an existing task. `None` means "leave unchanged", for
/// every field including `description`: a task that has a description cannot
/// have it cleared through an update, only replaced.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub completed: Option<bool>,
}

/// One audit record per tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallLog {
    pub id: i64,
    pub user_id: String,
    pub tool_name: String,
    /// JSON-encoded parameter object.
    pub tool_params: String,
    /// JSON-encoded result, if any.
    pub result: Option<String>,
    pub status: String,
    pub execution_time_ms: Option<f64>,
    /// JSON-encoded error details, if any.
    pub error_details: Option<String>,
    pub created_at: String,
}

/// Insert form of [`ToolCallLog`]; the id and timestamp are assigned on write.
#[derive(Debug, Clone)]
pub struct NewToolCallLog {
    pub user_id: String,
    pub tool_name: String,
    pub tool_params: String,
    pub result: Option<String>,
    pub status: String,
    pub execution_time_ms: Option<f64>,
    pub error_details: Option<String>,
}

/// A deferred destructive operation awaiting user approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: String,
    pub user_id: String,
    pub tool_name: String,
    /// JSON-encoded parameter object to replay on approval.
    pub tool_params: String,
    pub context: Option<String>,
    pub status: String,
    pub created_at: String,
    pub expires_at: String,
}

/// A chat conversation owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One message within a conversation.
///
/// The integer id is assigned by the database in insertion order; reads sort
/// on it, so messages within one exchange never interleave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub metadata: Option<String>,
    pub created_at: String,
}

/// Insert form of [`ConversationMessage`]; the id and timestamp are assigned on write.
#[derive(Debug, Clone)]
pub struct NewConversationMessage {
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub metadata: Option<String>,
}
