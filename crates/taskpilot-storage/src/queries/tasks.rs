// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task CRUD operations.
//!
//! Every query here is scoped by `user_id`; there is deliberately no way to
//! address another user's row through this module.

use rusqlite::params;

use taskpilot_core::{AgentError, StatusFilter};

use crate::database::Database;
use crate::models::{Task, TaskChanges};
use crate::now_rfc3339;

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<Task, rusqlite::Error> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        completed: row.get::<_, i64>(4)? != 0,
        priority: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const TASK_COLUMNS: &str =
    "id, user_id, title, description, completed, priority, created_at, updated_at";

/// Insert a new task and return the stored row.
pub async fn insert_task(
    db: &Database,
    user_id: &str,
    title: &str,
    description: Option<&str>,
    priority: &str,
) -> Result<Task, AgentError> {
    let user_id = user_id.to_string();
    let title = title.to_string();
    let description = description.map(str::to_string);
    let priority = priority.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tasks (user_id, title, description, completed, priority, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)",
                params![user_id, title, description, priority, now],
            )?;
            let id = conn.last_insert_rowid();
            let task = conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )?;
            Ok(task)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a single task owned by `user_id`.
pub async fn get_task(
    db: &Database,
    user_id: &str,
    task_id: i64,
) -> Result<Option<Task>, AgentError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"
            ))?;
            let mut rows = stmt.query_map(params![task_id, user_id], task_from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List tasks owned by `user_id`, optionally filtered by completion state.
pub async fn list_tasks(
    db: &Database,
    user_id: &str,
    filter: StatusFilter,
) -> Result<Vec<Task>, AgentError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let clause = match filter {
                StatusFilter::All => "",
                StatusFilter::Pending => " AND completed = 0",
                StatusFilter::Completed => " AND completed = 1",
            };
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1{clause} ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![user_id], task_from_row)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The most recently updated tasks for a user, newest first.
pub async fn recent_tasks(
    db: &Database,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Task>, AgentError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1
                 ORDER BY updated_at DESC, id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![user_id, limit], task_from_row)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply field changes to an owned task. Returns the updated row, or `None`
/// when no row matches the (id, owner) pair.
pub async fn update_task(
    db: &Database,
    user_id: &str,
    task_id: i64,
    changes: TaskChanges,
) -> Result<Option<Task>, AgentError> {
    let user_id = user_id.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let existing = {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"
                ))?;
                let mut rows = stmt.query_map(params![task_id, user_id], task_from_row)?;
                match rows.next() {
                    Some(row) => row?,
                    None => return Ok(None),
                }
            };

            let title = changes.title.unwrap_or(existing.title);
            // None keeps the stored description; updates replace, never clear.
            let description = changes.description.or(existing.description);
            let priority = changes.priority.unwrap_or(existing.priority);
            let completed = changes.completed.unwrap_or(existing.completed);

            conn.execute(
                "UPDATE tasks SET title = ?1, description = ?2, priority = ?3,
                        completed = ?4, updated_at = ?5
                 WHERE id = ?6 AND user_id = ?7",
                params![
                    title,
                    description,
                    priority,
                    completed as i64,
                    now,
                    task_id,
                    user_id
                ],
            )?;
            let task = conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                task_from_row,
            )?;
            Ok(Some(task))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flip the completion flag of an owned task. Returns the updated row, or
/// `None` when no row matches.
pub async fn toggle_completed(
    db: &Database,
    user_id: &str,
    task_id: i64,
) -> Result<Option<Task>, AgentError> {
    let user_id = user_id.to_string();
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET completed = 1 - completed, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3",
                params![now, task_id, user_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let task = conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                task_from_row,
            )?;
            Ok(Some(task))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete an owned task. Returns true when a row was removed.
pub async fn delete_task(db: &Database, user_id: &str, task_id: i64) -> Result<bool, AgentError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
