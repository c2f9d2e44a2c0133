// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user context reconstruction.
//!
//! Produces at most two system messages: one summarizing the most recent
//! tasks, one summarizing the most recent tool calls. The token budget is
//! approximate at 4 chars/token; trimming keeps the newest messages.

use std::sync::Arc;

use taskpilot_core::{AgentError, ChatMessage};
use taskpilot_storage::{Database, Task, ToolCallLog, queries};

/// Approximate characters per token for budget purposes.
const CHARS_PER_TOKEN: usize = 4;

/// Builds model context from recent per-user activity.
pub struct ContextAssembler {
    db: Arc<Database>,
    recent_items: usize,
    token_budget: usize,
}

fn format_task_line(task: &Task) -> String {
    let marker = if task.completed { "x" } else { " " };
    let description = task
        .description
        .as_deref()
        .map(|d| format!(" -- {d}"))
        .unwrap_or_default();
    format!(
        "- [{marker}] ({}) {} (id {}){description}",
        task.priority, task.title, task.id
    )
}

fn format_log_line(log: &ToolCallLog) -> String {
    format!("- {} {} at {}", log.tool_name, log.status, log.created_at)
}

impl ContextAssembler {
    pub fn new(db: Arc<Database>, recent_items: usize, token_budget: usize) -> Self {
        Self {
            db,
            recent_items,
            token_budget,
        }
    }

    /// Reconstruct context for `user_id`. Storage failures surface as
    /// context-retrieval errors; the caller decides whether to proceed.
    pub async fn reconstruct(&self, user_id: &str) -> Result<Vec<ChatMessage>, AgentError> {
        let tasks = queries::tasks::recent_tasks(&self.db, user_id, self.recent_items as i64)
            .await
            .map_err(|e| AgentError::ContextRetrieval(format!("recent tasks: {e}")))?;
        let logs = queries::audit::recent_logs(&self.db, user_id, self.recent_items as i64)
            .await
            .map_err(|e| AgentError::ContextRetrieval(format!("recent tool calls: {e}")))?;

        let mut messages = Vec::with_capacity(2);
        if !tasks.is_empty() {
            let lines: Vec<String> = tasks.iter().map(format_task_line).collect();
            messages.push(ChatMessage::system(format!(
                "The user's most recent tasks:\n{}",
                lines.join("\n")
            )));
        }
        if !logs.is_empty() {
            let lines: Vec<String> = logs.iter().map(format_log_line).collect();
            messages.push(ChatMessage::system(format!(
                "Recent actions taken for this user:\n{}",
                lines.join("\n")
            )));
        }
        Ok(messages)
    }

    /// Trim `messages` to the configured token budget.
    pub fn limit(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        limit_messages(messages, self.token_budget)
    }
}

/// Trim `messages` to `token_budget`, dropping oldest first. The newest
/// message survives even when it alone exceeds the budget.
pub fn limit_messages(messages: Vec<ChatMessage>, token_budget: usize) -> Vec<ChatMessage> {
    let budget_chars = token_budget * CHARS_PER_TOKEN;
    let mut kept = Vec::new();
    let mut used = 0usize;
    for message in messages.into_iter().rev() {
        let cost = message.content.chars().count();
        if !kept.is_empty() && used + cost > budget_chars {
            break;
        }
        used += cost;
        kept.push(message);
    }
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_storage::NewToolCallLog;
    use taskpilot_test_utils::temp_database;

    fn assembler(db: Arc<Database>) -> ContextAssembler {
        ContextAssembler::new(db, 5, 2000)
    }

    #[tokio::test]
    async fn empty_history_produces_no_messages() {
        let (db, _dir) = temp_database().await;
        let assembler = assembler(Arc::new(db));
        let messages = assembler.reconstruct("alice").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn reconstruct_emits_at_most_two_system_messages() {
        let (db, _dir) = temp_database().await;
        let db = Arc::new(db);

        for i in 0..8 {
            queries::tasks::insert_task(&db, "alice", &format!("task {i}"), None, "medium")
                .await
                .unwrap();
        }
        queries::audit::insert_log(
            &db,
            NewToolCallLog {
                user_id: "alice".into(),
                tool_name: "add_task".into(),
                tool_params: "{}".into(),
                result: None,
                status: "success".into(),
                execution_time_ms: Some(3.0),
                error_details: None,
            },
        )
        .await
        .unwrap();

        let assembler = assembler(db);
        let messages = assembler.reconstruct("alice").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role == "system"));
        // Capped at five recent tasks.
        assert_eq!(messages[0].content.matches("- [").count(), 5);
        assert!(messages[0].content.contains("task 7"));
        assert!(!messages[0].content.contains("task 0"));
        assert!(messages[1].content.contains("add_task success"));
    }

    #[tokio::test]
    async fn reconstruct_is_owner_scoped() {
        let (db, _dir) = temp_database().await;
        let db = Arc::new(db);
        queries::tasks::insert_task(&db, "bob", "bob's secret", None, "high")
            .await
            .unwrap();

        let assembler = assembler(db);
        let messages = assembler.reconstruct("alice").await.unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn limit_keeps_newest_within_budget() {
        let messages = vec![
            ChatMessage::system("a".repeat(6000)),
            ChatMessage::system("b".repeat(1000)),
            ChatMessage::user("c".repeat(1000)),
        ];
        // Budget of 500 tokens = 2000 chars: the oldest message must go.
        let kept = limit_messages(messages, 500);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].content.starts_with('b'));
        assert!(kept[1].content.starts_with('c'));
    }

    #[test]
    fn limit_always_keeps_the_newest_message() {
        let kept = limit_messages(vec![ChatMessage::user("z".repeat(10_000))], 10);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn limit_preserves_order_of_survivors() {
        let messages = vec![
            ChatMessage::system("one"),
            ChatMessage::system("two"),
            ChatMessage::user("three"),
        ];
        let kept = limit_messages(messages.clone(), 1000);
        assert_eq!(kept, messages);
    }
}
