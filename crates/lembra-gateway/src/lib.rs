// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook gateway.
//!
//! The HTTP layer does exactly three things per inbound webhook: verify
//! authenticity with the channel adapter, parse the payload into a
//! normalized message, and enqueue it for the dispatcher. The full
//! decision pipeline never runs inline, so provider platforms get a fast
//! ack regardless of LLM latency. Unverifiable requests are rejected
//! before anything touches the pipeline.

pub mod server;

pub use server::{build_router, serve, GatewayState};
