// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestrator test harness.
//!
//! Builds a full orchestrator over tempfile-backed SQLite with mock
//! LLM/enrichment backends, so integration tests drive real state
//! transitions through real persistence.

use std::sync::Arc;
use std::time::Duration;

use lembra_agent::{Orchestrator, OrchestratorConfig, ProviderRegistry};
use lembra_core::types::{IncomingMessage, Provider, Reply};
use lembra_core::{LembraError, StorageAdapter};
use lembra_storage::SqliteStorage;
use lembra_tools::ToolExecutor;

use crate::mock_channel::{inbound_text, MockChannel};
use crate::mock_enrich::MockEnrichment;
use crate::mock_llm::MockLlm;

/// Everything a test needs to drive one orchestrator.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub storage: Arc<SqliteStorage>,
    pub enrichment: Arc<MockEnrichment>,
    pub llm: Arc<MockLlm>,
    pub tools: Arc<ToolExecutor>,
    pub channel: Arc<MockChannel>,
    pub registry: Arc<ProviderRegistry>,
    _dir: tempfile::TempDir,
}

/// Tunable harness construction.
pub struct HarnessBuilder {
    llm_script: Vec<String>,
    llm_available: bool,
    disabled_tools: Vec<String>,
    blocked_terms: Vec<String>,
    auto_close: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            llm_script: Vec::new(),
            llm_available: false,
            disabled_tools: Vec::new(),
            blocked_terms: vec!["palavrão".to_string()],
            auto_close: Duration::from_secs(180),
        }
    }

    /// Script LLM responses (also marks the LLM available).
    pub fn with_llm_script(mut self, responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.llm_script = responses.into_iter().map(Into::into).collect();
        self.llm_available = true;
        self
    }

    pub fn with_disabled_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_close(mut self, delay: Duration) -> Self {
        self.auto_close = delay;
        self
    }

    pub async fn build(self) -> Result<Harness, LembraError> {
        let dir = tempfile::tempdir().map_err(LembraError::storage)?;
        let path = dir.path().join("harness.db");
        let storage = Arc::new(
            SqliteStorage::open_path(path.to_str().expect("utf8 temp path")).await?,
        );

        let enrichment = Arc::new(MockEnrichment::new());
        let llm = Arc::new(MockLlm::new(self.llm_script));

        let tools = Arc::new(ToolExecutor::new(
            storage.clone() as Arc<dyn StorageAdapter>,
            enrichment.clone(),
            &self.disabled_tools,
            "lembra".to_string(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            storage.clone() as Arc<dyn StorageAdapter>,
            if self.llm_available {
                Some(llm.clone() as Arc<dyn lembra_core::LlmProvider>)
            } else {
                None
            },
            enrichment.clone(),
            tools.clone(),
            OrchestratorConfig {
                assistant_name: "lembra".to_string(),
                auto_close: self.auto_close,
                stale_after: Duration::from_secs(600),
                moderation_enabled: true,
                blocked_terms: self.blocked_terms,
            },
        ));

        let channel = Arc::new(MockChannel::new(Provider::Telegram));
        let mut registry = ProviderRegistry::new();
        registry.register(channel.clone());

        Ok(Harness {
            orchestrator,
            storage,
            enrichment,
            llm,
            tools,
            channel,
            registry: Arc::new(registry),
            _dir: dir,
        })
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Process a plain text message from `user` and return the reply.
    pub async fn send(&self, user: &str, text: &str) -> Result<Reply, LembraError> {
        self.orchestrator
            .process_message(&inbound_text(Provider::Telegram, user, text))
            .await
    }

    /// Process an arbitrary inbound message.
    pub async fn send_message(&self, msg: &IncomingMessage) -> Result<Reply, LembraError> {
        self.orchestrator.process_message(msg).await
    }

    /// Current state string of the user's active conversation.
    pub async fn state_of(&self, user: &str) -> Result<Option<String>, LembraError> {
        Ok(self
            .storage
            .active_conversation(user)
            .await?
            .map(|c| c.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_and_processes() {
        let harness = HarnessBuilder::new().build().await.unwrap();
        let reply = harness.send("u1", "oi").await.unwrap();
        assert!(!reply.is_empty());
        assert_eq!(harness.state_of("u1").await.unwrap().as_deref(), Some("idle"));
    }
}
