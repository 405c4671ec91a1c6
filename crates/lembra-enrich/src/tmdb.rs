// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TMDB search client for movie and TV candidates.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use lembra_core::types::{Candidate, ItemType};
use lembra_core::LembraError;

/// Base URL for the TMDB v3 API.
const API_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Poster image base (w342 is plenty for chat cards).
const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w342";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
    /// Movies use `title`, TV uses `name`.
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

/// TMDB search client.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: reqwest::Client,
    api_key: String,
    language: String,
    base_url: String,
}

impl TmdbClient {
    pub fn new(api_key: String, language: String) -> Result<Self, LembraError> {
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
            language,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Search movies or TV shows. `item_type` must be `Movie` or `TvShow`.
    pub async fn search(
        &self,
        item_type: ItemType,
        query: &str,
    ) -> Result<Vec<Candidate>, LembraError> {
        let endpoint = match item_type {
            ItemType::Movie => "movie",
            ItemType::TvShow => "tv",
            other => {
                return Err(LembraError::Enrichment {
                    message: format!("tmdb cannot search item type `{other}`"),
                    source: None,
                })
            }
        };

        let url = format!("{}/search/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("query", query),
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
                message: format!("TMDB returned {status}: {body}"),
                source: None,
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| LembraError::Enrichment {
            message: format!("failed to decode response: {e}"),
            source: Some(Box::new(e)),
        })?;

        debug!(count = body.results.len(), endpoint, "tmdb search results");

        Ok(body.results.into_iter().map(to_candidate).collect())
    }
}

fn to_candidate(result: SearchResult) -> Candidate {
    let title = result
        .title
        .or(result.name)
        .unwrap_or_else(|| "(sem título)".to_string());
    let year = result
        .release_date
        .or(result.first_air_date)
        .and_then(|d| d.get(..4).map(str::to_string))
        .filter(|y| !y.is_empty());
    Candidate {
        external_id: result.id.to_string(),
        title,
        year,
        overview: result.overview.filter(|o| !o.is_empty()),
        genres: Vec::new(),
        poster_url: result
            .poster_path
            .map(|p| format!("{POSTER_BASE_URL}{p}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn movie_search_maps_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "interestelar"))
            .and(query_param("language", "pt-BR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": 157336,
                    "title": "Interestelar",
                    "release_date": "2014-11-05",
                    "overview": "Viagem através de um buraco de minhoca.",
                    "poster_path": "/abc.jpg"
                }]
            })))
            .mount(&server)
            .await;

        let client = TmdbClient::new("k".to_string(), "pt-BR".to_string())
            .unwrap()
            .with_base_url(server.uri());
        let candidates = client.search(ItemType::Movie, "interestelar").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].external_id, "157336");
        assert_eq!(candidates[0].year.as_deref(), Some("2014"));
        assert!(candidates[0].poster_url.as_deref().unwrap().ends_with("/abc.jpg"));
    }

    #[tokio::test]
    async fn tv_search_uses_name_and_first_air_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": 1396,
                    "name": "Breaking Bad",
                    "first_air_date": "2008-01-20"
                }]
            })))
            .mount(&server)
            .await;

        let client = TmdbClient::new("k".to_string(), "pt-BR".to_string())
            .unwrap()
            .with_base_url(server.uri());
        let candidates = client.search(ItemType::TvShow, "breaking bad").await.unwrap();
        assert_eq!(candidates[0].title, "Breaking Bad");
        assert_eq!(candidates[0].year.as_deref(), Some("2008"));
    }

    #[tokio::test]
    async fn empty_results_are_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;

        let client = TmdbClient::new("k".to_string(), "pt-BR".to_string())
            .unwrap()
            .with_base_url(server.uri());
        assert!(client.search(ItemType::Movie, "x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_type_is_rejected() {
        let client = TmdbClient::new("k".to_string(), "pt-BR".to_string()).unwrap();
        assert!(client.search(ItemType::Note, "x").await.is_err());
    }
}
