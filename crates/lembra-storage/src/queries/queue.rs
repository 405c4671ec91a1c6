// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue operations for crash-safe inbound processing.
//!
//! The `partition` column is the per-user serialization key: the
//! dispatcher runs one worker per partition, and `dequeue` only claims an
//! entry when no earlier entry of the same partition is still processing,
//! so per-user ordering holds even across crash recovery.

use rusqlite::params;

use lembra_core::{LembraError, QueueEntry};

use crate::database::{map_tr_err, Database};

const COLUMNS: &str =
    "id, partition_key, payload, status, attempts, max_attempts, created_at, updated_at, locked_until";

fn map_row(row: &rusqlite::Row<'_>) -> Result<QueueEntry, rusqlite::Error> {
    Ok(QueueEntry {
        id: row.get(0)?,
        partition: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        locked_until: row.get(8)?,
    })
}

/// Enqueue a new payload. Returns the auto-generated entry id.
pub async fn enqueue(db: &Database, partition: &str, payload: &str) -> Result<i64, LembraError> {
    let partition = partition.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (partition_key, payload) VALUES (?1, ?2)",
                params![partition, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next pending entry from a partition.
///
/// Atomically selects the oldest pending entry and marks it "processing"
/// with a 5-minute lock timeout. Returns `None` if the partition is empty
/// or an earlier entry is still being processed (with an unexpired lock).
pub async fn dequeue(db: &Database, partition: &str) -> Result<Option<QueueEntry>, LembraError> {
    let partition = partition.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // An unexpired in-flight entry blocks the partition to preserve
            // per-user ordering.
            let in_flight: i64 = tx.query_row(
                "SELECT COUNT(*) FROM queue
                 WHERE partition_key = ?1 AND status = 'processing'
                   AND locked_until > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![partition],
                |row| row.get(0),
            )?;
            if in_flight > 0 {
                tx.commit()?;
                return Ok(None);
            }

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {COLUMNS} FROM queue
                     WHERE partition_key = ?1
                       AND (status = 'pending'
                            OR (status = 'processing'
                                AND locked_until <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
                     ORDER BY id ASC
                     LIMIT 1"
                ))?;
                stmt.query_row(params![partition], map_row)
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE queue SET status = 'processing',
                         attempts = attempts + 1,
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;

                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        attempts: entry.attempts + 1,
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing: marks the entry "completed".
pub async fn ack(db: &Database, id: i64) -> Result<(), LembraError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed',
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a queue entry as failed.
///
/// If attempts have reached max_attempts, sets status to "failed".
/// Otherwise resets to "pending" for retry and clears the lock.
pub async fn fail(db: &Database, id: i64) -> Result<(), LembraError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET
                 status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Partitions that still have pending entries (crash recovery sweep).
pub async fn pending_partitions(db: &Database) -> Result<Vec<String>, LembraError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT partition_key FROM queue WHERE status = 'pending' ORDER BY partition_key",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            let mut partitions = Vec::new();
            for row in rows {
                partitions.push(row?);
            }
            Ok(partitions)
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

    #[tokio::test]
    async fn enqueue_dequeue_ack_cycle() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "user-1", r#"{"text":"oi"}"#).await.unwrap();

        let entry = dequeue(&db, "user-1").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, "processing");
        assert_eq!(entry.attempts, 1);

        ack(&db, id).await.unwrap();
        assert!(dequeue(&db, "user-1").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_flight_entry_blocks_partition() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, "user-1", "a").await.unwrap();
        enqueue(&db, "user-1", "b").await.unwrap();

        let first = dequeue(&db, "user-1").await.unwrap().unwrap();
        // Second dequeue in the same partition must wait for the first ack.
        assert!(dequeue(&db, "user-1").await.unwrap().is_none());

        ack(&db, first.id).await.unwrap();
        let second = dequeue(&db, "user-1").await.unwrap().unwrap();
        assert_eq!(second.payload, "b");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn partitions_are_independent() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, "user-1", "a").await.unwrap();
        enqueue(&db, "user-2", "b").await.unwrap();

        let first = dequeue(&db, "user-1").await.unwrap().unwrap();
        let second = dequeue(&db, "user-2").await.unwrap().unwrap();
        assert_eq!(first.payload, "a");
        assert_eq!(second.payload, "b");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_requeues_until_attempts_exhausted() {
        let (db, _dir) = setup_db().await;
        let id = enqueue(&db, "user-1", "a").await.unwrap();

        for expected_attempt in 1..=3 {
            let entry = dequeue(&db, "user-1").await.unwrap().unwrap();
            assert_eq!(entry.attempts, expected_attempt);
            fail(&db, id).await.unwrap();
        }

        // Third failure exhausted max_attempts (3): entry is dead.
        assert!(dequeue(&db, "user-1").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pending_partitions_lists_unprocessed() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, "user-2", "b").await.unwrap();
        enqueue(&db, "user-1", "a").await.unwrap();

        let partitions = pending_partitions(&db).await.unwrap();
        assert_eq!(partitions, vec!["user-1".to_string(), "user-2".to_string()]);
        db.close().await.unwrap();
    }
}
