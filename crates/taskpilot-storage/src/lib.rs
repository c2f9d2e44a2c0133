// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Taskpilot.
//!
//! One WAL-mode database accessed through tokio-rusqlite's connection
//! thread, with refinery-embedded migrations and typed query modules.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::{
    Conversation, ConversationMessage, NewConversationMessage, NewToolCallLog,
    PendingConfirmation, Task, TaskChanges, ToolCallLog,
};

use chrono::{SecondsFormat, Utc};

/// Current UTC time as an RFC3339 string with millisecond precision.
///
/// Stored timestamps sort lexicographically in chronological order, which
/// the expiry and retention queries rely on.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_rfc3339_has_millis_and_zulu_suffix() {
        let now = now_rfc3339();
        assert!(now.ends_with('Z'));
        // 2026-08-28T12:34:56.789Z
        assert_eq!(now.len(), 24);
    }
}
