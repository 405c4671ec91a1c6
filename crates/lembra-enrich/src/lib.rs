// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Enrichment lookup backends for the Lembra assistant.
//!
//! [`CompositeEnrichment`] routes by item type: movies and TV shows go to
//! TMDB, videos to YouTube. Types without a configured backend return an
//! empty candidate list so saves degrade to bare titles.

pub mod tmdb;
pub mod youtube;

use async_trait::async_trait;
use tracing::debug;

use lembra_config::model::EnrichmentConfig;
use lembra_core::types::{Candidate, ItemType};
use lembra_core::{EnrichmentProvider, LembraError};

pub use tmdb::TmdbClient;
pub use youtube::YoutubeClient;

/// Routes enrichment lookups to the right backend per item type.
pub struct CompositeEnrichment {
    tmdb: Option<TmdbClient>,
    youtube: Option<YoutubeClient>,
}

impl CompositeEnrichment {
    /// Build from config; backends without keys stay off.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, LembraError> {
        let tmdb = config
            .tmdb_api_key
            .as_ref()
            .map(|key| TmdbClient::new(key.clone(), config.language.clone()))
            .transpose()?;
        let youtube = config
            .youtube_api_key
            .as_ref()
            .map(|key| YoutubeClient::new(key.clone()))
            .transpose()?;
        Ok(Self { tmdb, youtube })
    }

    /// Build from explicit clients (tests).
    pub fn new(tmdb: Option<TmdbClient>, youtube: Option<YoutubeClient>) -> Self {
        Self { tmdb, youtube }
    }
}

#[async_trait]
impl EnrichmentProvider for CompositeEnrichment {
    fn name(&self) -> &str {
        "composite"
    }

    async fn search(
        &self,
        item_type: ItemType,
        query: &str,
    ) -> Result<Vec<Candidate>, LembraError> {
        match item_type {
            ItemType::Movie | ItemType::TvShow => match self.tmdb {
                Some(ref client) => client.search(item_type, query).await,
                None => {
                    debug!("tmdb not configured, returning no candidates");
                    Ok(Vec::new())
                }
            },
            ItemType::Video => match self.youtube {
                Some(ref client) => client.search(query).await,
                None => {
                    debug!("youtube not configured, returning no candidates");
                    Ok(Vec::new())
                }
            },
            ItemType::Note | ItemType::Link => Ok(Vec::new()),
        }
    }
}
