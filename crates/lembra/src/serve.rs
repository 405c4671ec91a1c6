// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lembra serve` command implementation.
//!
//! Wires the full assistant: SQLite storage, the configured LLM and
//! enrichment backends, the tool executor, the orchestrator, every
//! channel adapter the config enables, the webhook gateway, and the
//! Discord gateway task. All construction happens here and everything is
//! passed by injection; no module-level adapter state anywhere.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lembra_agent::{Dispatcher, Orchestrator, OrchestratorConfig, ProviderRegistry};
use lembra_config::model::LembraConfig;
use lembra_core::{LembraError, StorageAdapter};
use lembra_discord::DiscordChannel;
use lembra_enrich::CompositeEnrichment;
use lembra_gateway::GatewayState;
use lembra_storage::SqliteStorage;
use lembra_telegram::TelegramChannel;
use lembra_tools::ToolExecutor;
use lembra_whatsapp::{EvolutionChannel, WhatsappCloudChannel};

/// Initialize the tracing subscriber from the configured log level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lembra={log_level},warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Construct the provider registry from config gates.
fn build_registry(
    config: &LembraConfig,
) -> Result<(ProviderRegistry, Option<Arc<DiscordChannel>>), LembraError> {
    let allow_unverified = config.gateway.dev_allow_unverified;
    if allow_unverified {
        warn!("gateway.dev_allow_unverified is ON -- do not run this in production");
    }

    let mut registry = ProviderRegistry::new();
    let mut discord = None;

    if config.telegram.bot_token.is_some() {
        registry.register(Arc::new(TelegramChannel::new(
            config.telegram.clone(),
            allow_unverified,
        )?));
    }
    if config.whatsapp.cloud.access_token.is_some() {
        registry.register(Arc::new(WhatsappCloudChannel::new(
            config.whatsapp.cloud.clone(),
            allow_unverified,
        )?));
    }
    if config.whatsapp.evolution.base_url.is_some() {
        registry.register(Arc::new(EvolutionChannel::new(
            config.whatsapp.evolution.clone(),
            allow_unverified,
        )?));
    }
    if config.discord.bot_token.is_some() {
        let channel = Arc::new(DiscordChannel::new(config.discord.clone(), allow_unverified)?);
        registry.register(channel.clone());
        discord = Some(channel);
    }

    Ok((registry, discord))
}

/// Runs the `lembra serve` command.
pub async fn run_serve(config: LembraConfig) -> Result<(), LembraError> {
    init_tracing(&config.agent.log_level);
    info!("starting lembra serve");

    // Storage first: everything hangs off it.
    let storage: Arc<SqliteStorage> = Arc::new(SqliteStorage::open(&config.storage).await?);
    let storage_dyn: Arc<dyn StorageAdapter> = storage.clone();

    // LLM is optional: without a key the deterministic tiers carry the load.
    let llm = lembra_llm::build_provider(&config.llm)?;
    if llm.is_none() {
        warn!("no llm.api_key configured -- running on deterministic classifier tiers only");
    }

    let enrichment = Arc::new(CompositeEnrichment::from_config(&config.enrichment)?);

    let tools = Arc::new(ToolExecutor::new(
        storage_dyn.clone(),
        enrichment.clone(),
        &config.tools.disabled,
        config.agent.name.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        storage_dyn.clone(),
        llm,
        enrichment,
        tools,
        OrchestratorConfig {
            assistant_name: config.agent.name.clone(),
            auto_close: Duration::from_secs(config.agent.auto_close_secs),
            stale_after: Duration::from_secs(config.agent.stale_after_secs),
            moderation_enabled: config.moderation.enabled,
            blocked_terms: config.moderation.blocked_terms.clone(),
        },
    ));

    let (registry, discord) = build_registry(&config)?;
    if registry.is_empty() {
        warn!("no channels configured -- the gateway will reject everything");
    }
    let registry = Arc::new(registry);

    let dispatcher = Dispatcher::new(
        orchestrator,
        storage_dyn.clone(),
        registry.clone(),
        config.agent.agent_id.clone(),
    );
    dispatcher.recover().await?;

    let cancel = CancellationToken::new();

    // Discord rides its own gateway connection rather than webhooks.
    if let (Some(channel), Some(token)) = (discord, config.discord.bot_token.clone()) {
        let (tx, mut rx) = tokio::sync::mpsc::channel(256);
        let forwarder_dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = forwarder_dispatcher.submit(&message).await {
                    error!(error = %e, "discord submit failed");
                }
            }
        });
        let gateway_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = lembra_discord::gateway::run_gateway(token, channel, tx) => {
                    if let Err(e) = result {
                        error!(error = %e, "discord gateway exited");
                    }
                }
                _ = gateway_cancel.cancelled() => {}
            }
        });
    }

    let state = GatewayState {
        dispatcher,
        registry: registry.clone(),
        whatsapp_verify_token: config.whatsapp.cloud.verify_token.clone(),
    };
    let addr: SocketAddr = config
        .gateway
        .bind_address
        .parse()
        .map_err(|e| LembraError::Config(format!("gateway.bind_address: {e}")))?;

    let serve_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = lembra_gateway::serve(state, addr, serve_cancel).await {
            error!(error = %e, "gateway server failed");
        }
    });

    // Run until ctrl-c, then drain.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| LembraError::Internal(format!("signal handler: {e}")))?;
    info!("shutdown signal received");
    cancel.cancel();

    let _ = server.await;
    registry.shutdown_all().await?;
    storage.close().await?;

    info!("lembra stopped");
    Ok(())
}
