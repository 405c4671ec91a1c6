// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user settings and moderation bookkeeping.

use rusqlite::params;

use lembra_core::{LembraError, UserRecord};

use crate::database::{map_tr_err, Database};

/// Fetch the user's row, creating a default one when absent.
pub async fn get_or_create(db: &Database, user_id: &str) -> Result<UserRecord, LembraError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (user_id, created_at, updated_at)
                 VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![user_id],
            )?;
            let mut stmt = conn.prepare(
                "SELECT user_id, assistant_name, offense_count, timeout_until
                 FROM users WHERE user_id = ?1",
            )?;
            let record = stmt.query_row(params![user_id], |row| {
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    assistant_name: row.get(1)?,
                    offense_count: row.get(2)?,
                    timeout_until: row.get(3)?,
                })
            })?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// Set the user's preferred assistant name.
pub async fn set_assistant_name(
    db: &Database,
    user_id: &str,
    name: &str,
) -> Result<(), LembraError> {
    let user_id = user_id.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (user_id, assistant_name, created_at, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT (user_id) DO UPDATE SET
                   assistant_name = excluded.assistant_name,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![user_id, name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Increment the user's offense count and set the timeout window.
/// Returns the new count. Counts are monotonic; timeout expiry never
/// resets them.
pub async fn record_offense(
    db: &Database,
    user_id: &str,
    timeout_until: &str,
) -> Result<i64, LembraError> {
    let user_id = user_id.to_string();
    let timeout_until = timeout_until.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (user_id, offense_count, timeout_until, created_at, updated_at)
                 VALUES (?1, 1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT (user_id) DO UPDATE SET
                   offense_count = offense_count + 1,
                   timeout_until = excluded.timeout_until,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![user_id, timeout_until],
            )?;
            let count = conn.query_row(
                "SELECT offense_count FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}
