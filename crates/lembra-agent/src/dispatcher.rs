// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user serialized dispatch over the durable queue.
//!
//! Webhook handlers only validate, parse, and `submit` — the full pipeline
//! runs here, decoupled from the HTTP response. One worker task per user
//! partition drains that partition strictly in order, which is what makes
//! the conversation's read-merge-write cycle safe without any global lock.
//! Outbound delivery failures are logged and swallowed; an inbound message
//! is never reprocessed because its reply failed to send.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use lembra_core::session_key::{build_session_key, PeerKind, SessionKeyParams};
use lembra_core::types::{IncomingMessage, Reply};
use lembra_core::{LembraError, QueueEntry, StorageAdapter};

use crate::orchestrator::Orchestrator;
use crate::registry::ProviderRegistry;
use crate::responses;

/// Routes inbound messages into per-user worker partitions.
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    storage: Arc<dyn StorageAdapter>,
    registry: Arc<ProviderRegistry>,
    agent_id: String,
    workers: DashMap<String, mpsc::Sender<()>>,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        storage: Arc<dyn StorageAdapter>,
        registry: Arc<ProviderRegistry>,
        agent_id: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            storage,
            registry,
            agent_id,
            workers: DashMap::new(),
        })
    }

    /// Stable session key correlating a message to its messaging surface.
    fn session_key_for(&self, msg: &IncomingMessage) -> String {
        let params = SessionKeyParams {
            agent_id: self.agent_id.clone(),
            channel: msg.provider.to_string(),
            peer_kind: if msg.metadata.is_group {
                PeerKind::Group
            } else {
                PeerKind::Direct
            },
            peer_id: msg.external_id.clone(),
            // In groups the sender scopes the dialogue within the peer.
            dm_scope: if msg.metadata.is_group {
                Some(msg.user_id.clone())
            } else {
                None
            },
        };
        build_session_key(&params).unwrap_or_else(|_| format!("agent:{}", self.agent_id))
    }

    /// Durably enqueue a message and wake its partition worker. Returns
    /// the queue entry id.
    pub async fn submit(self: &Arc<Self>, msg: &IncomingMessage) -> Result<i64, LembraError> {
        let payload =
            serde_json::to_string(msg).map_err(|e| LembraError::Internal(e.to_string()))?;
        let id = self.storage.enqueue(&msg.user_id, &payload).await?;
        debug!(user_id = %msg.user_id, entry_id = id, "message enqueued");
        self.nudge(&msg.user_id);
        Ok(id)
    }

    /// Wake workers for every partition with pending work (startup
    /// recovery after a crash).
    pub async fn recover(self: &Arc<Self>) -> Result<(), LembraError> {
        let partitions = self.storage.pending_partitions().await?;
        if !partitions.is_empty() {
            info!(count = partitions.len(), "recovering pending queue partitions");
        }
        for partition in partitions {
            self.nudge(&partition);
        }
        Ok(())
    }

    /// Ensure a worker exists for the partition and signal it.
    fn nudge(self: &Arc<Self>, partition: &str) {
        let tx = self
            .workers
            .entry(partition.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(8);
                let this = Arc::clone(self);
                let partition = partition.to_string();
                tokio::spawn(async move {
                    this.worker_loop(partition, rx).await;
                });
                tx
            })
            .clone();
        // A full buffer is fine: the worker will drain the queue anyway.
        let _ = tx.try_send(());
    }

    async fn worker_loop(self: Arc<Self>, partition: String, mut rx: mpsc::Receiver<()>) {
        debug!(partition = %partition, "partition worker started");
        loop {
            loop {
                match self.storage.dequeue(&partition).await {
                    Ok(Some(entry)) => self.process_entry(entry).await,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(partition = %partition, error = %e, "dequeue failed");
                        break;
                    }
                }
            }
            if rx.recv().await.is_none() {
                debug!(partition = %partition, "partition worker stopping");
                break;
            }
        }
    }

    async fn process_entry(&self, entry: QueueEntry) {
        let msg: IncomingMessage = match serde_json::from_str(&entry.payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "unreadable queue payload, dropping");
                let _ = self.storage.ack(entry.id).await;
                return;
            }
        };

        let session_key = self.session_key_for(&msg);
        debug!(session_key = %session_key, entry_id = entry.id, "processing queue entry");

        let provider = self.registry.get(msg.provider);

        if let Some(ref provider) = provider {
            if let Some(ref callback_id) = msg.callback_query_id {
                if let Err(e) = provider.answer_callback(callback_id).await {
                    debug!(error = %e, "answer_callback failed");
                }
            }
            if let Err(e) = provider.mark_read(&msg.external_id, &msg.message_id).await {
                debug!(error = %e, "mark_read failed");
            }
            if let Err(e) = provider.send_typing(&msg.external_id).await {
                debug!(error = %e, "send_typing failed");
            }
        }

        match self.orchestrator.process_message(&msg).await {
            Ok(reply) => {
                self.deliver(provider.as_deref(), &msg, &reply).await;
                if let Err(e) = self.storage.ack(entry.id).await {
                    warn!(entry_id = entry.id, error = %e, "ack failed");
                }
            }
            Err(e) => {
                error!(entry_id = entry.id, error = %e, "message processing failed");
                // A generic apology, then ack: retrying would risk
                // duplicate replies for a non-transient failure.
                self.deliver(
                    provider.as_deref(),
                    &msg,
                    &Reply::text(responses::APOLOGY),
                )
                .await;
                if let Err(e) = self.storage.ack(entry.id).await {
                    warn!(entry_id = entry.id, error = %e, "ack failed");
                }
            }
        }
    }

    /// Best-effort delivery: failures are logged, never retried.
    async fn deliver(
        &self,
        provider: Option<&dyn lembra_core::MessagingProvider>,
        msg: &IncomingMessage,
        reply: &Reply,
    ) {
        if reply.is_empty() {
            return;
        }
        let Some(provider) = provider else {
            warn!(provider = %msg.provider, "no adapter registered for provider, reply dropped");
            return;
        };
        if let Err(e) = provider.deliver(&msg.external_id, reply).await {
            warn!(
                provider = %msg.provider,
                external_id = %msg.external_id,
                error = %e,
                "outbound delivery failed"
            );
        }
    }
}
