// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending-confirmation storage.
//!
//! Rows are durable so a restart cannot silently drop a pending destructive
//! operation. Consumption (approve/reject) deletes the row; expiry is
//! enforced by comparing `expires_at` against the caller-supplied now.

use rusqlite::params;

use taskpilot_core::AgentError;

use crate::database::Database;
use crate::models::PendingConfirmation;

const CONFIRMATION_COLUMNS: &str =
    "id, user_id, tool_name, tool_params, context, status, created_at, expires_at";

fn confirmation_from_row(
    row: &rusqlite::Row<'_>,
) -> Result<PendingConfirmation, rusqlite::Error> {
    Ok(PendingConfirmation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tool_name: row.get(2)?,
        tool_params: row.get(3)?,
        context: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

/// Store a new pending confirmation.
pub async fn insert(db: &Database, confirmation: PendingConfirmation) -> Result<(), AgentError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO pending_confirmations
                     (id, user_id, tool_name, tool_params, context, status, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    confirmation.id,
                    confirmation.user_id,
                    confirmation.tool_name,
                    confirmation.tool_params,
                    confirmation.context,
                    confirmation.status,
                    confirmation.created_at,
                    confirmation.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a confirmation by id regardless of owner or expiry. The state
/// machine above this layer decides how to treat what it finds.
pub async fn get(db: &Database, id: &str) -> Result<Option<PendingConfirmation>, AgentError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFIRMATION_COLUMNS} FROM pending_confirmations WHERE id = ?1"
            ))?;
            let mut rows = stmt.query_map(params![id], confirmation_from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove a confirmation. Returns true when a row was removed.
pub async fn delete(db: &Database, id: &str) -> Result<bool, AgentError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM pending_confirmations WHERE id = ?1",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Unexpired pending confirmations for one user, oldest first.
pub async fn list_pending(
    db: &Database,
    user_id: &str,
    now: &str,
) -> Result<Vec<PendingConfirmation>, AgentError> {
    let user_id = user_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFIRMATION_COLUMNS} FROM pending_confirmations
                 WHERE user_id = ?1 AND status = 'pending' AND expires_at > ?2
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![user_id, now], confirmation_from_row)?;
            let mut pending = Vec::new();
            for row in rows {
                pending.push(row?);
            }
            Ok(pending)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete every expired confirmation. Returns the number removed.
pub async fn delete_expired(db: &Database, now: &str) -> Result<usize, AgentError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM pending_confirmations WHERE expires_at <= ?1",
                params![now],
            )?;
            Ok(deleted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("confirmations.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_confirmation(id: &str, user: &str, expires_at: &str) -> PendingConfirmation {
        PendingConfirmation {
            id: id.to_string(),
            user_id: user.to_string(),
            tool_name: "delete_task".to_string(),
            tool_params: r#"{"task_id":1}"#.to_string(),
            context: Some("delete task 1".to_string()),
            status: "pending".to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            expires_at: expires_at.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_get_delete_round_trip() {
        let (db, _dir) = setup_db().await;

        let confirmation = make_confirmation("c-1", "alice", "9999-01-01T00:00:00.000Z");
        insert(&db, confirmation.clone()).await.unwrap();

        let fetched = get(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(fetched, confirmation);

        assert!(delete(&db, "c-1").await.unwrap());
        assert!(get(&db, "c-1").await.unwrap().is_none());
        assert!(!delete(&db, "c-1").await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_pending_excludes_other_users_and_expired() {
        let (db, _dir) = setup_db().await;
        let now = "2026-06-01T00:00:00.000Z";

        insert(&db, make_confirmation("live", "alice", "2026-06-01T00:10:00.000Z"))
            .await
            .unwrap();
        insert(&db, make_confirmation("stale", "alice", "2026-05-31T00:00:00.000Z"))
            .await
            .unwrap();
        insert(&db, make_confirmation("other", "bob", "2026-06-01T00:10:00.000Z"))
            .await
            .unwrap();

        let pending = list_pending(&db, "alice", now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "live");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_expired_sweeps_only_stale_rows() {
        let (db, _dir) = setup_db().await;
        let now = "2026-06-01T00:00:00.000Z";

        insert(&db, make_confirmation("live", "alice", "2026-06-01T00:10:00.000Z"))
            .await
            .unwrap();
        insert(&db, make_confirmation("stale-1", "alice", "2026-05-01T00:00:00.000Z"))
            .await
            .unwrap();
        insert(&db, make_confirmation("stale-2", "bob", "2026-05-02T00:00:00.000Z"))
            .await
            .unwrap();

        let swept = delete_expired(&db, now).await.unwrap();
        assert_eq!(swept, 2);
        assert!(get(&db, "live").await.unwrap().is_some());
        assert!(get(&db, "stale-1").await.unwrap().is_none());

        db.close().await.unwrap();
    }
}
