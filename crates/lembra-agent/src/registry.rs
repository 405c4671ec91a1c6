// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit provider registry.
//!
//! Channels are constructed once at startup and injected here; nothing in
//! the orchestrator ever names a concrete channel type. Lifecycle
//! (shutdown) runs through the registry as well.

use std::sync::Arc;

use tracing::{info, warn};

use lembra_core::types::Provider;
use lembra_core::{LembraError, MessagingProvider};

/// Registry of connected messaging providers, keyed by [`Provider`].
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MessagingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Last registration wins for a given channel.
    pub fn register(&mut self, provider: Arc<dyn MessagingProvider>) {
        info!(name = provider.name(), channel = %provider.provider(), "provider registered");
        self.providers.retain(|p| p.provider() != provider.provider());
        self.providers.push(provider);
    }

    /// Look up the adapter for a channel.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn MessagingProvider>> {
        self.providers
            .iter()
            .find(|p| p.provider() == provider)
            .cloned()
    }

    /// All registered adapters.
    pub fn all(&self) -> &[Arc<dyn MessagingProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Shut down every registered adapter, logging failures.
    pub async fn shutdown_all(&self) -> Result<(), LembraError> {
        for provider in &self.providers {
            if let Err(e) = provider.shutdown().await {
                warn!(name = provider.name(), error = %e, "provider shutdown error");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lembra_core::types::{ChannelCapabilities, IncomingMessage};
    use lembra_core::WebhookRequest;

    struct FakeProvider(Provider);

    #[async_trait]
    impl MessagingProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn provider(&self) -> Provider {
            self.0
        }

        fn capabilities(&self) -> ChannelCapabilities {
            ChannelCapabilities::text_only()
        }

        fn verify_webhook(&self, _request: &WebhookRequest) -> bool {
            true
        }

        fn parse_incoming(&self, _payload: &serde_json::Value) -> Option<IncomingMessage> {
            None
        }

        async fn send_text(&self, _external_id: &str, _text: &str) -> Result<(), LembraError> {
            Ok(())
        }
    }

    #[test]
    fn lookup_by_channel() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider(Provider::Telegram)));
        registry.register(Arc::new(FakeProvider(Provider::Discord)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(Provider::Telegram).is_some());
        assert!(registry.get(Provider::WhatsappCloud).is_none());
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider(Provider::Telegram)));
        registry.register(Arc::new(FakeProvider(Provider::Telegram)));
        assert_eq!(registry.len(), 1);
    }
}
