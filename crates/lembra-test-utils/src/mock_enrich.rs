// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned enrichment provider for deterministic testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use lembra_core::types::{Candidate, ItemType};
use lembra_core::{EnrichmentProvider, LembraError};

/// Serves canned candidate lists keyed by (item type, lowercased query).
/// Unknown queries return no candidates; `fail_all` turns every lookup
/// into an error.
pub struct MockEnrichment {
    canned: Mutex<HashMap<(ItemType, String), Vec<Candidate>>>,
    fail_all: bool,
}

impl MockEnrichment {
    pub fn new() -> Self {
        Self {
            canned: Mutex::new(HashMap::new()),
            fail_all: false,
        }
    }

    /// An enrichment backend that always errors.
    pub fn failing() -> Self {
        Self {
            canned: Mutex::new(HashMap::new()),
            fail_all: true,
        }
    }

    /// Register candidates for a query.
    pub fn stub(&self, item_type: ItemType, query: &str, candidates: Vec<Candidate>) {
        self.canned
            .lock()
            .expect("canned lock")
            .insert((item_type, query.to_lowercase()), candidates);
    }

    /// Convenience: a simple movie candidate.
    pub fn movie(external_id: &str, title: &str, year: &str) -> Candidate {
        Candidate {
            external_id: external_id.to_string(),
            title: title.to_string(),
            year: Some(year.to_string()),
            overview: Some(format!("Sinopse de {title}.")),
            genres: vec!["Ficção científica".to_string()],
            poster_url: Some(format!("https://img.example/{external_id}.jpg")),
        }
    }
}

impl Default for MockEnrichment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentProvider for MockEnrichment {
    fn name(&self) -> &str {
        "mock-enrichment"
    }

    async fn search(
        &self,
        item_type: ItemType,
        query: &str,
    ) -> Result<Vec<Candidate>, LembraError> {
        if self.fail_all {
            return Err(LembraError::Enrichment {
                message: "mock enrichment configured to fail".to_string(),
                source: None,
            });
        }
        Ok(self
            .canned
            .lock()
            .expect("canned lock")
            .get(&(item_type, query.to_lowercase()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stubbed_queries_return_candidates() {
        let enrich = MockEnrichment::new();
        enrich.stub(
            ItemType::Movie,
            "interestelar",
            vec![MockEnrichment::movie("157336", "Interestelar", "2014")],
        );

        let found = enrich.search(ItemType::Movie, "Interestelar").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(enrich
            .search(ItemType::Movie, "desconhecido")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failing_backend_errors() {
        let enrich = MockEnrichment::failing();
        assert!(enrich.search(ItemType::Movie, "x").await.is_err());
    }
}
