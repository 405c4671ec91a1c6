// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Lembra assistant.
//!
//! All writes go through a single tokio-rusqlite background connection;
//! the schema is managed by embedded refinery migrations.

pub mod adapter;
pub mod database;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
