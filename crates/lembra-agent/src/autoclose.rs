// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed auto-close jobs for idle conversations.
//!
//! One cancellable job per conversation id. Rescheduling atomically
//! replaces the pending job (the old token is cancelled by the map
//! insert), so a conversation never gets two competing closes. The job
//! re-checks the conversation right before closing: only a still-active,
//! still-idle conversation is closed.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lembra_core::StorageAdapter;

/// Schedules and replaces delayed close jobs keyed by conversation id.
pub struct CloseScheduler {
    storage: Arc<dyn StorageAdapter>,
    delay: Duration,
    jobs: Arc<DashMap<String, (u64, CancellationToken)>>,
    generation: std::sync::atomic::AtomicU64,
}

impl CloseScheduler {
    pub fn new(storage: Arc<dyn StorageAdapter>, delay: Duration) -> Self {
        Self {
            storage,
            delay,
            jobs: Arc::new(DashMap::new()),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Schedule (or replace) the close job for a conversation.
    pub fn schedule(&self, conversation_id: &str) {
        let token = CancellationToken::new();
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if let Some((_, previous)) = self
            .jobs
            .insert(conversation_id.to_string(), (generation, token.clone()))
        {
            previous.cancel();
        }

        let storage = Arc::clone(&self.storage);
        let jobs = Arc::clone(&self.jobs);
        let delay = self.delay;
        let id = conversation_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(conversation_id = %id, "auto-close job replaced or cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            // Drop our map entry only if it is still our generation.
            jobs.remove_if(&id, |_, (g, _)| *g == generation);

            match storage.conversation(&id).await {
                Ok(Some(conversation))
                    if conversation.is_active && conversation.state == "idle" =>
                {
                    if let Err(e) = storage.close_conversation(&id).await {
                        warn!(conversation_id = %id, error = %e, "auto-close failed");
                    } else {
                        debug!(conversation_id = %id, "conversation auto-closed");
                    }
                }
                Ok(_) => {
                    debug!(conversation_id = %id, "auto-close skipped, conversation moved on");
                }
                Err(e) => {
                    warn!(conversation_id = %id, error = %e, "auto-close lookup failed");
                }
            }
        });
    }

    /// Cancel any pending job for a conversation.
    pub fn cancel(&self, conversation_id: &str) {
        if let Some((_, (_, token))) = self.jobs.remove(conversation_id) {
            token.cancel();
        }
    }

    /// Number of currently pending jobs (tests).
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }
}
