// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory item operations.
//!
//! Search is a ranked LIKE query over title and content: title prefix
//! matches sort first, then title substring matches, then content matches,
//! newest first within a rank. The embedding-based ranker is an external
//! collaborator; this is the local fallback it degrades to.

use std::str::FromStr;

use rusqlite::params;

use lembra_core::types::ItemType;
use lembra_core::{LembraError, MemoryItemRecord};

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, user_id, item_type, title, content, url, metadata, created_at";

fn map_row(row: &rusqlite::Row<'_>) -> Result<MemoryItemRecord, rusqlite::Error> {
    let item_type_str: String = row.get(2)?;
    let item_type = ItemType::from_str(&item_type_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown item type `{item_type_str}`").into(),
        )
    })?;
    Ok(MemoryItemRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        item_type,
        title: row.get(3)?,
        content: row.get(4)?,
        url: row.get(5)?,
        metadata: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Insert a memory item.
pub async fn insert(db: &Database, item: &MemoryItemRecord) -> Result<(), LembraError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO memory_items
                 (id, user_id, item_type, title, content, url, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    item.id,
                    item.user_id,
                    item.item_type.to_string(),
                    item.title,
                    item.content,
                    item.url,
                    item.metadata,
                    item.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Case-insensitive exact-title lookup for duplicate detection.
pub async fn find_by_title(
    db: &Database,
    user_id: &str,
    item_type: ItemType,
    title: &str,
) -> Result<Option<MemoryItemRecord>, LembraError> {
    let user_id = user_id.to_string();
    let item_type = item_type.to_string();
    let title = title.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM memory_items
                 WHERE user_id = ?1 AND item_type = ?2 AND title = ?3 COLLATE NOCASE
                 LIMIT 1"
            ))?;
            let result = stmt.query_row(params![user_id, item_type, title], map_row);
            match result {
                Ok(item) => Ok(Some(item)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Ranked substring search over titles and content.
pub async fn search(
    db: &Database,
    user_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<MemoryItemRecord>, LembraError> {
    let user_id = user_id.to_string();
    let pattern = format!("%{}%", escape_like(query));
    let prefix = format!("{}%", escape_like(query));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM memory_items
                 WHERE user_id = ?1
                   AND (title LIKE ?2 ESCAPE '\\' OR content LIKE ?2 ESCAPE '\\')
                 ORDER BY
                   CASE
                     WHEN title LIKE ?3 ESCAPE '\\' THEN 0
                     WHEN title LIKE ?2 ESCAPE '\\' THEN 1
                     ELSE 2
                   END,
                   created_at DESC
                 LIMIT ?4"
            ))?;
            let rows = stmt.query_map(params![user_id, pattern, prefix, limit as i64], map_row)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent items for a user, newest first.
pub async fn list(
    db: &Database,
    user_id: &str,
    limit: usize,
) -> Result<Vec<MemoryItemRecord>, LembraError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM memory_items
                 WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![user_id, limit as i64], map_row)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete one item scoped to its owner. Returns `false` when absent.
pub async fn delete(db: &Database, user_id: &str, item_id: &str) -> Result<bool, LembraError> {
    let user_id = user_id.to_string();
    let item_id = item_id.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memory_items WHERE user_id = ?1 AND id = ?2",
                params![user_id, item_id],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every item for a user, returning the count removed.
pub async fn delete_all(db: &Database, user_id: &str) -> Result<u64, LembraError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memory_items WHERE user_id = ?1",
                params![user_id],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete items matching a query, returning the count removed.
pub async fn delete_by_query(
    db: &Database,
    user_id: &str,
    query: &str,
) -> Result<u64, LembraError> {
    let user_id = user_id.to_string();
    let pattern = format!("%{}%", escape_like(query));
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memory_items
                 WHERE user_id = ?1
                   AND (title LIKE ?2 ESCAPE '\\' OR content LIKE ?2 ESCAPE '\\')",
                params![user_id, pattern],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Escape LIKE wildcards in user-supplied query text.
fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
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

    fn make_item(id: &str, item_type: ItemType, title: &str, created_at: &str) -> MemoryItemRecord {
        MemoryItemRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            item_type,
            title: title.to_string(),
            content: None,
            url: None,
            metadata: None,
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_list() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_item("i1", ItemType::Movie, "Interestelar", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();
        insert(&db, &make_item("i2", ItemType::Note, "Feira", "2026-01-01T00:00:02.000Z"))
            .await
            .unwrap();

        let items = list(&db, "u1", 10).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "i2"); // newest first
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_by_title_is_case_insensitive() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_item("i1", ItemType::Movie, "Interestelar", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();

        let found = find_by_title(&db, "u1", ItemType::Movie, "interestelar")
            .await
            .unwrap();
        assert!(found.is_some());

        let other_type = find_by_title(&db, "u1", ItemType::Note, "interestelar")
            .await
            .unwrap();
        assert!(other_type.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn search_ranks_title_prefix_first() {
        let (db, _dir) = setup_db().await;
        let mut with_content = make_item("i1", ItemType::Note, "Compras", "2026-01-01T00:00:01.000Z");
        with_content.content = Some("lembrar do mercado".to_string());
        insert(&db, &with_content).await.unwrap();
        insert(&db, &make_item("i2", ItemType::Note, "Mercado central", "2026-01-01T00:00:02.000Z"))
            .await
            .unwrap();
        insert(&db, &make_item("i3", ItemType::Note, "Ir ao mercado", "2026-01-01T00:00:03.000Z"))
            .await
            .unwrap();

        let items = search(&db, "u1", "mercado", 10).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, "i2"); // title prefix
        assert_eq!(items[1].id, "i3"); // title substring
        assert_eq!(items[2].id, "i1"); // content match
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn like_wildcards_in_query_are_literal() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_item("i1", ItemType::Note, "100% certo", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();
        insert(&db, &make_item("i2", ItemType::Note, "outra coisa", "2026-01-01T00:00:02.000Z"))
            .await
            .unwrap();

        let items = search(&db, "u1", "100%", 10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "i1");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_scoped_to_owner() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_item("i1", ItemType::Note, "minha", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();

        assert!(!delete(&db, "u2", "i1").await.unwrap());
        assert!(delete(&db, "u1", "i1").await.unwrap());
        assert!(!delete(&db, "u1", "i1").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_all_and_by_query_return_counts() {
        let (db, _dir) = setup_db().await;
        insert(&db, &make_item("i1", ItemType::Note, "feira de sábado", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();
        insert(&db, &make_item("i2", ItemType::Note, "feira de domingo", "2026-01-01T00:00:02.000Z"))
            .await
            .unwrap();
        insert(&db, &make_item("i3", ItemType::Movie, "Akira", "2026-01-01T00:00:03.000Z"))
            .await
            .unwrap();

        assert_eq!(delete_by_query(&db, "u1", "feira").await.unwrap(), 2);
        assert_eq!(delete_all(&db, "u1").await.unwrap(), 1);
        assert!(list(&db, "u1", 10).await.unwrap().is_empty());
        db.close().await.unwrap();
    }
}
