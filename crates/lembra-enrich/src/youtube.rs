// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! YouTube Data API search client for video candidates.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use lembra_core::types::Candidate;
use lembra_core::LembraError;

/// Base URL for the YouTube Data API v3.
const API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: VideoId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct VideoId {
    #[serde(rename = "videoId", default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "publishedAt", default)]
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    #[serde(default)]
    high: Option<Thumbnail>,
    #[serde(default)]
    medium: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// YouTube search client.
#[derive(Debug, Clone)]
pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(api_key: String) -> Result<Self, LembraError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| LembraError::Enrichment {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Search videos by free text.
    pub async fn search(&self, query: &str) -> Result<Vec<Candidate>, LembraError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", "7"),
                ("q", query),
            ])
            .send()
            .await
            .map_err(|e| LembraError::Enrichment {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LembraError::Enrichment {
                message: format!("YouTube returned {status}: {body}"),
                source: None,
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| LembraError::Enrichment {
            message: format!("failed to decode response: {e}"),
            source: Some(Box::new(e)),
        })?;

        debug!(count = body.items.len(), "youtube search results");

        Ok(body
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                let thumbnail = item
                    .snippet
                    .thumbnails
                    .high
                    .or(item.snippet.thumbnails.medium)
                    .map(|t| t.url);
                Some(Candidate {
                    external_id: video_id,
                    title: item.snippet.title,
                    year: item
                        .snippet
                        .published_at
                        .and_then(|d| d.get(..4).map(str::to_string)),
                    overview: item.snippet.description.filter(|d| !d.is_empty()),
                    genres: Vec::new(),
                    poster_url: thumbnail,
                })
            })
            .collect())
    }
}
