// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp channel adapters for the Lembra assistant.
//!
//! Two independent backends behind the same [`MessagingProvider`] surface:
//! the official Cloud API ([`cloud`]) and a self-hosted Evolution bridge
//! ([`evolution`]). Deployments enable either or both.

pub mod cloud;
pub mod evolution;

pub use cloud::WhatsappCloudChannel;
pub use evolution::EvolutionChannel;
