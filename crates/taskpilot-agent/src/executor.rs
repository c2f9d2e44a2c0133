// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool executor: parameter validation, owner-scoped dispatch, and the
//! normalized result shape `{success, task?, task_id?, message, error_code?}`.
//!
//! Business-rule failures (bad title, missing row) come back as unsuccessful
//! results so the orchestrator can audit and report them; only malformed
//! parameters and unknown tools are hard errors.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use taskpilot_core::{AgentError, Priority, StatusFilter};
use taskpilot_storage::{Database, TaskChanges, queries};

/// Maximum title length after trimming.
const MAX_TITLE_CHARS: usize = 200;
/// Maximum description length.
const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Executes catalog tools against the task store.
pub struct ToolExecutor {
    db: Arc<Database>,
}

fn failure(error_code: &str, message: impl Into<String>) -> Value {
    json!({
        "success": false,
        "error_code": error_code,
        "message": message.into(),
    })
}

fn db_failure(e: &AgentError) -> Value {
    warn!(error = %e, "tool dispatch hit a storage failure");
    failure("DATABASE_ERROR", "a database error occurred")
}

fn require_task_id(params: &Value) -> Result<i64, AgentError> {
    match params.get("task_id").and_then(Value::as_i64) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(AgentError::InvalidParameters(
            "task_id must be a positive integer".to_string(),
        )),
    }
}

fn optional_priority(params: &Value) -> Result<Option<Priority>, AgentError> {
    match params.get("priority") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Priority::from_str(s).map(Some).map_err(|_| {
            AgentError::InvalidParameters(format!(
                "priority must be one of low, medium, high (got {s:?})"
            ))
        }),
        Some(_) => Err(AgentError::InvalidParameters(
            "priority must be a string".to_string(),
        )),
    }
}

fn optional_description(params: &Value) -> Result<Option<String>, AgentError> {
    match params.get("description") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.chars().count() <= MAX_DESCRIPTION_CHARS => {
            Ok(Some(s.clone()))
        }
        Some(Value::String(_)) => Err(AgentError::InvalidParameters(format!(
            "description exceeds {MAX_DESCRIPTION_CHARS} characters"
        ))),
        Some(_) => Err(AgentError::InvalidParameters(
            "description must be a string".to_string(),
        )),
    }
}

impl ToolExecutor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Execute one tool for `user_id` and return the normalized result.
    pub async fn execute(
        &self,
        user_id: &str,
        tool_name: &str,
        params: &Value,
    ) -> Result<Value, AgentError> {
        match tool_name {
            "add_task" => self.add_task(user_id, params).await,
            "list_tasks" => self.list_tasks(user_id, params).await,
            "update_task" => self.update_task(user_id, params).await,
            "complete_task" => self.complete_task(user_id, params).await,
            "delete_task" => self.delete_task(user_id, params).await,
            other => Err(AgentError::ToolNotFound(other.to_string())),
        }
    }

    async fn add_task(&self, user_id: &str, params: &Value) -> Result<Value, AgentError> {
        let title = match params.get("title").and_then(Value::as_str) {
            Some(raw) => raw.trim().to_string(),
            None => {
                return Err(AgentError::InvalidParameters(
                    "title must be a string".to_string(),
                ));
            }
        };
        if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
            return Ok(failure(
                "INVALID_TITLE",
                format!("title must be 1-{MAX_TITLE_CHARS} characters after trimming"),
            ));
        }
        let description = optional_description(params)?;
        let priority = optional_priority(params)?.unwrap_or_default();

        match queries::tasks::insert_task(
            &self.db,
            user_id,
            &title,
            description.as_deref(),
            &priority.to_string(),
        )
        .await
        {
            Ok(task) => {
                let message = format!("Task '{}' created", task.title);
                Ok(json!({
                    "success": true,
                    "task": task,
                    "message": message,
                }))
            }
            Err(e) => Ok(db_failure(&e)),
        }
    }

    async fn list_tasks(&self, user_id: &str, params: &Value) -> Result<Value, AgentError> {
        let filter = match params.get("status") {
            None | Some(Value::Null) => StatusFilter::All,
            Some(Value::String(s)) => StatusFilter::from_str(s).map_err(|_| {
                AgentError::InvalidParameters(format!(
                    "status must be one of all, pending, completed (got {s:?})"
                ))
            })?,
            Some(_) => {
                return Err(AgentError::InvalidParameters(
                    "status must be a string".to_string(),
                ));
            }
        };

        match queries::tasks::list_tasks(&self.db, user_id, filter).await {
            Ok(tasks) => {
                let count = tasks.len();
                Ok(json!({
                    "success": true,
                    "tasks": tasks,
                    "count": count,
                    "message": format!("Found {count} task(s)"),
                }))
            }
            Err(e) => Ok(db_failure(&e)),
        }
    }

    async fn update_task(&self, user_id: &str, params: &Value) -> Result<Value, AgentError> {
        let task_id = require_task_id(params)?;

        let title = match params.get("title") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => {
                let trimmed = raw.trim().to_string();
                if trimmed.is_empty() || trimmed.chars().count() > MAX_TITLE_CHARS {
                    return Ok(failure(
                        "INVALID_TITLE",
                        format!("title must be 1-{MAX_TITLE_CHARS} characters after trimming"),
                    ));
                }
                Some(trimmed)
            }
            Some(_) => {
                return Err(AgentError::InvalidParameters(
                    "title must be a string".to_string(),
                ));
            }
        };
        let description = optional_description(params)?;
        let priority = optional_priority(params)?;

        let changes = TaskChanges {
            title,
            description,
            priority: priority.map(|p| p.to_string()),
            completed: None,
        };
        match queries::tasks::update_task(&self.db, user_id, task_id, changes).await {
            Ok(Some(task)) => Ok(json!({
                "success": true,
                "task": task,
                "message": format!("Task {task_id} updated"),
            })),
            Ok(None) => Ok(failure(
                "TASK_NOT_FOUND_OR_UNAUTHORIZED",
                format!("task {task_id} not found for this user"),
            )),
            Err(e) => Ok(db_failure(&e)),
        }
    }

    async fn complete_task(&self, user_id: &str, params: &Value) -> Result<Value, AgentError> {
        let task_id = require_task_id(params)?;
        let completed = match params.get("completed") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(AgentError::InvalidParameters(
                    "completed must be a boolean".to_string(),
                ));
            }
        };

        let changes = TaskChanges {
            completed: Some(completed),
            ..Default::default()
        };
        match queries::tasks::update_task(&self.db, user_id, task_id, changes).await {
            Ok(Some(task)) => Ok(json!({
                "success": true,
                "task": task,
                "message": if completed {
                    format!("Task {task_id} completed")
                } else {
                    format!("Task {task_id} reopened")
                },
            })),
            Ok(None) => Ok(failure(
                "TASK_NOT_FOUND_OR_UNAUTHORIZED",
                format!("task {task_id} not found for this user"),
            )),
            Err(e) => Ok(db_failure(&e)),
        }
    }

    async fn delete_task(&self, user_id: &str, params: &Value) -> Result<Value, AgentError> {
        let task_id = require_task_id(params)?;
        match queries::tasks::delete_task(&self.db, user_id, task_id).await {
            Ok(true) => Ok(json!({
                "success": true,
                "task_id": task_id,
                "message": format!("Task {task_id} deleted"),
            })),
            Ok(false) => Ok(failure(
                "TASK_NOT_FOUND_OR_UNAUTHORIZED",
                format!("task {task_id} not found for this user"),
            )),
            Err(e) => Ok(db_failure(&e)),
        }
    }
}
