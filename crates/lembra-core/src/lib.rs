// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core trait definitions, error types, and common types for the Lembra
//! multi-channel memory assistant.
//!
//! Everything the orchestrator touches is expressed here as a capability
//! trait: messaging channels, LLM backends, enrichment lookups, and
//! storage. Concrete implementations live in sibling crates and are wired
//! together by the binary at startup.

pub mod error;
pub mod session_key;
pub mod traits;
pub mod types;

pub use error::LembraError;
pub use session_key::{build_session_key, parse_session_key, PeerKind, SessionKeyParams};
pub use traits::{
    ChatRole, ChatTurn, ConversationRecord, EnrichmentProvider, LlmProvider, MemoryItemRecord,
    MessageRecord, MessagingProvider, QueueEntry, StorageAdapter, UserRecord, WebhookRequest,
};
