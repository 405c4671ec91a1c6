// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! embedded migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;
use tracing::debug;

use lembra_core::LembraError;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Convert a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> LembraError {
    LembraError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the SQLite database, shared by all query modules.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, LembraError> {
        let conn = Connection::open(path).await.map_err(LembraError::storage)?;

        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        let report = conn
            .call(|conn| embedded::migrations::runner().run(conn))
            .await
            .map_err(LembraError::storage)?;

        debug!(
            applied = report.applied_migrations().len(),
            "database migrations applied"
        );

        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Flush and close the background connection thread.
    pub async fn close(&self) -> Result<(), LembraError> {
        self.conn.clone().close().await.map_err(map_tr_err)
    }
}
