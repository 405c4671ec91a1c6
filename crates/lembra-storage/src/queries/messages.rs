// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only transcript operations.
//!
//! Inserts are idempotent on `(provider, provider_message_id)`: replaying
//! the same provider message never creates a second row.

use rusqlite::params;

use lembra_core::{LembraError, MessageRecord};

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, conversation_id, role, content, provider, external_id, \
                       provider_message_id, provider_payload, created_at";

fn map_row(row: &rusqlite::Row<'_>) -> Result<MessageRecord, rusqlite::Error> {
    Ok(MessageRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        provider: row.get(4)?,
        external_id: row.get(5)?,
        provider_message_id: row.get(6)?,
        provider_payload: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Append a transcript entry. Returns `false` when the row was deduplicated
/// against an existing provider message id.
pub async fn append(db: &Database, record: &MessageRecord) -> Result<bool, LembraError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages
                 (id, conversation_id, role, content, provider, external_id,
                  provider_message_id, provider_payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.conversation_id,
                    record.role,
                    record.content,
                    record.provider,
                    record.external_id,
                    record.provider_message_id,
                    record.provider_payload,
                    record.created_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent entries for a conversation, oldest first.
pub async fn recent(
    db: &Database,
    conversation_id: &str,
    limit: usize,
) -> Result<Vec<MessageRecord>, LembraError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM (
                     SELECT {COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2
                 ) ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_id, limit as i64], map_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
