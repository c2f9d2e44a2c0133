// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and message persistence.

use rusqlite::params;

use taskpilot_core::AgentError;

use crate::database::Database;
use crate::models::{Conversation, ConversationMessage, NewConversationMessage};
use crate::now_rfc3339;

/// Create a conversation owned by `user_id`.
pub async fn create_conversation(
    db: &Database,
    id: &str,
    user_id: &str,
    title: Option<&str>,
) -> Result<Conversation, AgentError> {
    let id = id.to_string();
    let user_id = user_id.to_string();
    let title = title.map(str::to_string);
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, user_id, title, now],
            )?;
            Ok(Conversation {
                id,
                user_id,
                title,
                created_at: now.clone(),
                updated_at: now,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch an owned conversation.
pub async fn get_conversation(
    db: &Database,
    user_id: &str,
    id: &str,
) -> Result<Option<Conversation>, AgentError> {
    let user_id = user_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM conversations WHERE id = ?1 AND user_id = ?2",
            )?;
            let mut rows = stmt.query_map(params![id, user_id], |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Append a message and bump the conversation's `updated_at`, atomically.
///
/// The message id is assigned by the database; it is the insertion order
/// within the whole table and the sort key for [`get_messages`].
pub async fn append_message(
    db: &Database,
    message: NewConversationMessage,
) -> Result<ConversationMessage, AgentError> {
    let now = now_rfc3339();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversation_messages
                     (conversation_id, role, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.conversation_id,
                    message.role,
                    message.content,
                    message.metadata,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, message.conversation_id],
            )?;
            tx.commit()?;
            Ok(ConversationMessage {
                id,
                conversation_id: message.conversation_id,
                role: message.role,
                content: message.content,
                metadata: message.metadata,
                created_at: now,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Messages of a conversation in insertion order.
pub async fn get_messages(
    db: &Database,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<ConversationMessage>, AgentError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = match limit {
                Some(_) => {
                    "SELECT id, conversation_id, role, content, metadata, created_at
                     FROM conversation_messages WHERE conversation_id = ?1
                     ORDER BY id ASC LIMIT ?2"
                }
                None => {
                    "SELECT id, conversation_id, role, content, metadata, created_at
                     FROM conversation_messages WHERE conversation_id = ?1
                     ORDER BY id ASC"
                }
            };
            let mut stmt = conn.prepare(sql)?;
            let map_row = |row: &rusqlite::Row<'_>| {
                Ok(ConversationMessage {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    metadata: row.get(4)?,
                    created_at: row.get(5)?,
                })
            };
            let mut messages = Vec::new();
            match limit {
                Some(lim) => {
                    let rows = stmt.query_map(params![conversation_id, lim], map_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let rows = stmt.query_map(params![conversation_id], map_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }
            Ok(messages)
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
        let path = dir.path().join("conversations.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_message(conv: &str, role: &str, content: &str) -> NewConversationMessage {
        NewConversationMessage {
            conversation_id: conv.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn conversation_lifecycle() {
        let (db, _dir) = setup_db().await;

        let conversation = create_conversation(&db, "conv-1", "alice", Some("groceries"))
            .await
            .unwrap();
        assert_eq!(conversation.user_id, "alice");

        let first = append_message(&db, make_message("conv-1", "user", "add milk"))
            .await
            .unwrap();
        let second = append_message(&db, make_message("conv-1", "assistant", "added"))
            .await
            .unwrap();
        assert!(second.id > first.id);

        let messages = get_messages(&db, "conv-1", None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");

        let limited = get_messages(&db, "conv-1", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn messages_keep_insertion_order_within_one_timestamp() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, "conv-1", "alice", None).await.unwrap();

        // Back-to-back appends routinely land in the same millisecond; the
        // read order must still be the write order.
        for (role, content) in [
            ("user", "remember milk"),
            ("assistant", "noted"),
            ("user", "and bread"),
            ("assistant", "noted too"),
        ] {
            append_message(&db, make_message("conv-1", role, content))
                .await
                .unwrap();
        }

        let messages = get_messages(&db, "conv-1", None).await.unwrap();
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user", "assistant"]);
        assert_eq!(messages[2].content, "and bread");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_conversation_is_owner_scoped() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, "conv-1", "alice", None).await.unwrap();

        assert!(get_conversation(&db, "alice", "conv-1").await.unwrap().is_some());
        assert!(get_conversation(&db, "bob", "conv-1").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn append_bumps_conversation_updated_at() {
        let (db, _dir) = setup_db().await;
        create_conversation(&db, "conv-1", "alice", None).await.unwrap();
        let before = get_conversation(&db, "alice", "conv-1")
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        append_message(&db, make_message("conv-1", "user", "hi"))
            .await
            .unwrap();

        let after = get_conversation(&db, "alice", "conv-1")
            .await
            .unwrap()
            .unwrap();
        assert!(after.updated_at >= before.updated_at);

        db.close().await.unwrap();
    }
}
