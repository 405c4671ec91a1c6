// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family.

pub mod conversations;
pub mod memory;
pub mod messages;
pub mod queue;
pub mod users;
