// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lembra assistant.

use thiserror::Error;

/// The primary error type used across all Lembra traits and core operations.
#[derive(Debug, Error)]
pub enum LembraError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging channel errors (send failure, malformed payload, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM provider errors (API failure, token limits, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Enrichment lookup errors (TMDB/YouTube API failure, malformed response).
    #[error("enrichment error: {message}")]
    Enrichment {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A tool rejected its input or failed while executing.
    #[error("tool `{name}` failed: {message}")]
    Tool { name: String, message: String },

    /// A session key string did not match the expected format.
    #[error("invalid session key: {0}")]
    InvalidSessionKey(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LembraError {
    /// Wrap an arbitrary error as a storage error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LembraError::Storage {
            source: Box::new(source),
        }
    }

    /// Build a channel error from a message only.
    pub fn channel(message: impl Into<String>) -> Self {
        LembraError::Channel {
            message: message.into(),
            source: None,
        }
    }

    /// Build a provider error from a message only.
    pub fn provider(message: impl Into<String>) -> Self {
        LembraError::Provider {
            message: message.into(),
            source: None,
        }
    }
}
