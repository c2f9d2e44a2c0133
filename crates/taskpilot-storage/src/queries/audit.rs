// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-call audit log operations.

use rusqlite::params;

use taskpilot_core::AgentError;

use crate::database::Database;
use crate::models::{NewToolCallLog, ToolCallLog};
use crate::now_rfc3339;

const LOG_COLUMNS: &str = "id, user_id, tool_name, tool_params, result, status, \
                           execution_time_ms, error_details, created_at";

fn log_from_row(row: &rusqlite::Row<'_>) -> Result<ToolCallLog, rusqlite::Error> {
    Ok(ToolCallLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tool_name: row.get(2)?,
        tool_params: row.get(3)?,
        result: row.get(4)?,
        status: row.get(5)?,
        execution_time_ms: row.get(6)?,
        error_details: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn insert_one(
    conn: &rusqlite::Connection,
    log: &NewToolCallLog,
    now: &str,
) -> Result<ToolCallLog, rusqlite::Error> {
    conn.execute(
        "INSERT INTO tool_call_logs
             (user_id, tool_name, tool_params, result, status, execution_time_ms, error_details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            log.user_id,
            log.tool_name,
            log.tool_params,
            log.result,
            log.status,
            log.execution_time_ms,
            log.error_details,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {LOG_COLUMNS} FROM tool_call_logs WHERE id = ?1"),
        params![id],
        log_from_row,
    )
}

/// Insert a single audit record and return the stored row.
pub async fn insert_log(db: &Database, log: NewToolCallLog) -> Result<ToolCallLog, AgentError> {
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let stored = insert_one(conn, &log, &now)?;
            Ok(stored)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert several audit records in one transaction. All-or-nothing.
pub async fn insert_logs(
    db: &Database,
    logs: Vec<NewToolCallLog>,
) -> Result<Vec<ToolCallLog>, AgentError> {
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut stored = Vec::with_capacity(logs.len());
            for log in &logs {
                stored.push(insert_one(&tx, log, &now)?);
            }
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Filter options for [`history`] and [`count_history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub tool_name: Option<String>,
    pub status: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

fn filter_clauses(filter: &HistoryFilter) -> (String, Vec<String>) {
    let mut sql = String::new();
    let mut binds = Vec::new();
    if let Some(tool_name) = &filter.tool_name {
        binds.push(tool_name.clone());
        sql.push_str(&format!(" AND tool_name = ?{}", binds.len() + 1));
    }
    if let Some(status) = &filter.status {
        binds.push(status.clone());
        sql.push_str(&format!(" AND status = ?{}", binds.len() + 1));
    }
    if let Some(start) = &filter.start {
        binds.push(start.clone());
        sql.push_str(&format!(" AND created_at >= ?{}", binds.len() + 1));
    }
    if let Some(end) = &filter.end {
        binds.push(end.clone());
        sql.push_str(&format!(" AND created_at <= ?{}", binds.len() + 1));
    }
    (sql, binds)
}

/// Filtered audit history for one user, newest first.
pub async fn history(
    db: &Database,
    user_id: &str,
    filter: HistoryFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ToolCallLog>, AgentError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let (clauses, binds) = filter_clauses(&filter);
            let sql = format!(
                "SELECT {LOG_COLUMNS} FROM tool_call_logs WHERE user_id = ?1{clauses}
                 ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
                binds.len() + 2,
                binds.len() + 3,
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];
            for bind in binds {
                param_values.push(Box::new(bind));
            }
            param_values.push(Box::new(limit));
            param_values.push(Box::new(offset));
            let param_refs: Vec<&dyn rusqlite::ToSql> =
                param_values.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(param_refs.as_slice(), log_from_row)?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Total rows matching the filter, for pagination.
pub async fn count_history(
    db: &Database,
    user_id: &str,
    filter: HistoryFilter,
) -> Result<i64, AgentError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let (clauses, binds) = filter_clauses(&filter);
            let sql = format!(
                "SELECT COUNT(*) FROM tool_call_logs WHERE user_id = ?1{clauses}"
            );
            let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];
            for bind in binds {
                param_values.push(Box::new(bind));
            }
            let param_refs: Vec<&dyn rusqlite::ToSql> =
                param_values.iter().map(|b| b.as_ref()).collect();
            let count = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
            Ok(count)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The most recent audit records for one user, newest first.
pub async fn recent_logs(
    db: &Database,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ToolCallLog>, AgentError> {
    history(db, user_id, HistoryFilter::default(), limit, 0).await
}

/// Delete rows older than `cutoff`, at most `max_batch` per call.
///
/// `DELETE ... LIMIT` needs a non-default SQLite compile flag, so the batch
/// cap goes through an id subquery instead.
pub async fn delete_older_than(
    db: &Database,
    cutoff: &str,
    max_batch: i64,
) -> Result<usize, AgentError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM tool_call_logs WHERE id IN (
                     SELECT id FROM tool_call_logs WHERE created_at < ?1
                     ORDER BY created_at ASC LIMIT ?2
                 )",
                params![cutoff, max_batch],
            )?;
            Ok(deleted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
