// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD operations.
//!
//! `create_active` enforces the one-active-conversation-per-user invariant
//! transactionally: prior active rows are deactivated in the same
//! transaction that inserts the new one, and a partial unique index backs
//! the invariant at the schema level.

use rusqlite::params;

use lembra_core::{ConversationRecord, LembraError};

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, user_id, state, context, is_active, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> Result<ConversationRecord, rusqlite::Error> {
    Ok(ConversationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        state: row.get(2)?,
        context: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// The user's active conversation, if any.
pub async fn active_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Option<ConversationRecord>, LembraError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations WHERE user_id = ?1 AND is_active = 1"
            ))?;
            let result = stmt.query_row(params![user_id], map_row);
            match result {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a conversation by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<ConversationRecord>, LembraError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"))?;
            let result = stmt.query_row(params![id], map_row);
            match result {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a new active conversation, deactivating any prior active
/// conversations for the same user in the same transaction.
pub async fn create_active(
    db: &Database,
    record: &ConversationRecord,
) -> Result<(), LembraError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE conversations SET is_active = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE user_id = ?1 AND is_active = 1",
                params![record.user_id],
            )?;
            tx.execute(
                "INSERT INTO conversations (id, user_id, state, context, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                params![
                    record.id,
                    record.user_id,
                    record.state,
                    record.context,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a conversation's state and context as a unit.
pub async fn update(
    db: &Database,
    id: &str,
    state: &str,
    context: &str,
) -> Result<(), LembraError> {
    let id = id.to_string();
    let state = state.to_string();
    let context = context.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET state = ?1, context = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![state, context, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a conversation closed and inactive.
pub async fn close(db: &Database, id: &str) -> Result<(), LembraError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET state = 'closed', is_active = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_conversation(id: &str, user_id: &str) -> ConversationRecord {
        ConversationRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            state: "idle".to_string(),
            context: "{}".to_string(),
            is_active: true,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_active() {
        let (db, _dir) = setup_db().await;
        create_active(&db, &make_conversation("c1", "u1")).await.unwrap();

        let active = active_for_user(&db, "u1").await.unwrap().unwrap();
        assert_eq!(active.id, "c1");
        assert!(active.is_active);
        assert_eq!(active.state, "idle");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_conversation_deactivates_first() {
        let (db, _dir) = setup_db().await;
        create_active(&db, &make_conversation("c1", "u1")).await.unwrap();
        create_active(&db, &make_conversation("c2", "u1")).await.unwrap();

        let active = active_for_user(&db, "u1").await.unwrap().unwrap();
        assert_eq!(active.id, "c2");

        let first = get(&db, "c1").await.unwrap().unwrap();
        assert!(!first.is_active);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn at_most_one_active_row_per_user() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            create_active(&db, &make_conversation(&format!("c{i}"), "u1"))
                .await
                .unwrap();
        }

        let count: i64 = db
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM conversations WHERE user_id = 'u1' AND is_active = 1",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_persists_state_and_context() {
        let (db, _dir) = setup_db().await;
        create_active(&db, &make_conversation("c1", "u1")).await.unwrap();

        update(&db, "c1", "awaiting_context", r#"{"attempts":1}"#)
            .await
            .unwrap();

        let record = get(&db, "c1").await.unwrap().unwrap();
        assert_eq!(record.state, "awaiting_context");
        assert_eq!(record.context, r#"{"attempts":1}"#);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_marks_inactive() {
        let (db, _dir) = setup_db().await;
        create_active(&db, &make_conversation("c1", "u1")).await.unwrap();
        close(&db, "c1").await.unwrap();

        let record = get(&db, "c1").await.unwrap().unwrap();
        assert_eq!(record.state, "closed");
        assert!(!record.is_active);
        assert!(active_for_user(&db, "u1").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn users_do_not_interfere() {
        let (db, _dir) = setup_db().await;
        create_active(&db, &make_conversation("c1", "u1")).await.unwrap();
        create_active(&db, &make_conversation("c2", "u2")).await.unwrap();

        assert_eq!(active_for_user(&db, "u1").await.unwrap().unwrap().id, "c1");
        assert_eq!(active_for_user(&db, "u2").await.unwrap().unwrap().id, "c2");
        db.close().await.unwrap();
    }
}
