// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation orchestration for the Lembra assistant.
//!
//! The crate is organized around one turn of conversation:
//!
//! - [`dispatcher`] pulls inbound messages off the durable per-user queue
//!   and guarantees per-user serialization.
//! - [`orchestrator`] runs the turn: moderation, conversation resolution,
//!   transcript append, state dispatch, bookkeeping.
//! - [`decision`] is the pure `(intent, state)` table; [`clarify`],
//!   [`candidates`], and the batch handling in the orchestrator are the
//!   sub-protocols it routes into.
//! - [`planner`] validates LLM planner output; the model never drives
//!   state transitions directly.
//! - [`autoclose`] closes idle conversations after a delay; [`moderation`]
//!   applies progressive timeouts.

pub mod autoclose;
pub mod candidates;
pub mod clarify;
pub mod decision;
pub mod dispatcher;
pub mod moderation;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod responses;
pub mod state;

pub use autoclose::CloseScheduler;
pub use clarify::MAX_CLARIFICATION_ATTEMPTS;
pub use decision::{decide_action, Decision};
pub use dispatcher::Dispatcher;
pub use moderation::ModerationGuard;
pub use orchestrator::{Orchestrator, OrchestratorConfig, MAX_REPROCESS_DEPTH};
pub use registry::ProviderRegistry;
pub use state::{ConversationContext, ConversationState};
