// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content enrichment trait (TMDB, YouTube).

use async_trait::async_trait;

use crate::error::LembraError;
use crate::types::{Candidate, ItemType};

/// Looks up external metadata candidates for a save request.
///
/// Implementations return candidates ranked by the backend's own relevance;
/// the disambiguation protocol owns capping and presentation.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync + 'static {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Search for candidates of `item_type` matching `query`.
    ///
    /// An empty result is not an error; it means the item saves bare.
    async fn search(
        &self,
        item_type: ItemType,
        query: &str,
    ) -> Result<Vec<Candidate>, LembraError>;
}
