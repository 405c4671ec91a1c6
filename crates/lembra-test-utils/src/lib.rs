// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Lembra integration tests: mock channel, scripted
//! LLM, canned enrichment, and a full orchestrator harness over tempfile
//! SQLite.

pub mod harness;
pub mod mock_channel;
pub mod mock_enrich;
pub mod mock_llm;

pub use harness::{Harness, HarnessBuilder};
pub use mock_channel::{inbound_callback, inbound_text, MockChannel, SentItem};
pub use mock_enrich::MockEnrichment;
pub use mock_llm::MockLlm;
