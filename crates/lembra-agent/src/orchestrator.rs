// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation orchestrator.
//!
//! `process_message` owns the whole turn: moderation gate, conversation
//! resolution, transcript append (idempotent), state dispatch, and
//! post-action bookkeeping. Handlers either produce a reply with the next
//! state, or request that the message re-enter the idle pipeline
//! ("reprocess as new input"), which is bounded by
//! [`MAX_REPROCESS_DEPTH`] so two states can never ping-pong forever.
//!
//! The LLM shows up in exactly two places — the classifier tier and the
//! planner — and neither decides state transitions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use lembra_core::types::{
    IncomingMessage, IntentResult, ItemType, Reply, CALLBACK_CHOOSE_AGAIN, CALLBACK_CONFIRM_FINAL,
};
use lembra_core::{
    ConversationRecord, EnrichmentProvider, LembraError, LlmProvider, MemoryItemRecord,
    MessageRecord, StorageAdapter,
};
use lembra_intent::IntentClassifier;
use lembra_tools::{ToolContext, ToolExecutor, ToolName};

use crate::autoclose::CloseScheduler;
use crate::candidates::{self, SelectionOutcome};
use crate::clarify::{self, ClarifyOutcome, MAX_CLARIFICATION_ATTEMPTS};
use crate::decision::{decide_action, Decision};
use crate::moderation::{is_timed_out, ModerationGuard};
use crate::planner::{self, PlannerAction};
use crate::responses;
use crate::state::{
    BatchItem, BatchStatus, ContextPatch, ConversationContext, ConversationState,
};

/// Bound on "reprocess as new message" re-entries per inbound message.
pub const MAX_REPROCESS_DEPTH: u32 = 3;

/// Transcript window handed to the planner.
const PLANNER_HISTORY: usize = 10;

/// Orchestrator tuning knobs taken from config.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub assistant_name: String,
    pub auto_close: Duration,
    pub stale_after: Duration,
    pub moderation_enabled: bool,
    pub blocked_terms: Vec<String>,
}

/// What one state handler decided.
enum Step {
    Reply {
        reply: Reply,
        state: ConversationState,
        /// Pure small talk skips auto-close scheduling.
        casual: bool,
    },
    /// Reset to idle and run the same message through the pipeline again.
    Reprocess,
}

impl Step {
    fn reply(reply: Reply, state: ConversationState) -> Self {
        Step::Reply {
            reply,
            state,
            casual: false,
        }
    }

    fn casual(reply: Reply) -> Self {
        Step::Reply {
            reply,
            state: ConversationState::Idle,
            casual: true,
        }
    }
}

/// The conversation orchestration engine.
pub struct Orchestrator {
    storage: Arc<dyn StorageAdapter>,
    classifier: IntentClassifier,
    llm: Option<Arc<dyn LlmProvider>>,
    enrichment: Arc<dyn EnrichmentProvider>,
    tools: Arc<ToolExecutor>,
    closer: CloseScheduler,
    moderation: ModerationGuard,
    assistant_name: String,
    stale_after: chrono::Duration,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        llm: Option<Arc<dyn LlmProvider>>,
        enrichment: Arc<dyn EnrichmentProvider>,
        tools: Arc<ToolExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        let closer = CloseScheduler::new(Arc::clone(&storage), config.auto_close);
        Self {
            storage,
            classifier: IntentClassifier::new(llm.clone()),
            llm,
            enrichment,
            tools,
            closer,
            moderation: ModerationGuard::new(config.moderation_enabled, &config.blocked_terms),
            assistant_name: config.assistant_name,
            stale_after: chrono::Duration::from_std(config.stale_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(10)),
        }
    }

    /// Process one normalized inbound message and produce the reply to
    /// deliver. An empty reply means "send nothing".
    pub async fn process_message(&self, msg: &IncomingMessage) -> Result<Reply, LembraError> {
        let text = msg.text.trim();
        if text.is_empty() && msg.callback_data.is_none() {
            debug!(user_id = %msg.user_id, "empty message, short-circuit");
            return Ok(Reply::default());
        }

        // Moderation gate: timed-out users get silence, offenses extend it.
        let user = self.storage.user(&msg.user_id).await?;
        if is_timed_out(user.timeout_until.as_deref(), Utc::now()) {
            debug!(user_id = %msg.user_id, "user timed out, dropping message");
            return Ok(Reply::default());
        }
        if self.moderation.is_offensive(text) {
            let until =
                ModerationGuard::timeout_until(user.offense_count + 1, Utc::now()).to_rfc3339();
            let count = self.storage.record_offense(&msg.user_id, &until).await?;
            info!(user_id = %msg.user_id, offense = count, "offensive message, timing out");
            return Ok(Reply::default());
        }

        let conversation = self.resolve_conversation(&msg.user_id).await?;

        // Idempotent transcript append: a replayed provider message id
        // means this message was already handled — no second reply.
        if !self.append_user_message(msg, &conversation).await? {
            debug!(message_id = %msg.message_id, "duplicate message, dropping");
            return Ok(Reply::default());
        }

        let mut state = conversation
            .state
            .parse::<ConversationState>()
            .unwrap_or(ConversationState::Idle);
        let mut context = ConversationContext::from_json(&conversation.context);

        let mut depth = 0u32;
        let (reply, final_state, casual) = loop {
            let step = self.dispatch(msg, state, &mut context, &conversation).await?;
            match step {
                Step::Reply {
                    reply,
                    state,
                    casual,
                } => break (reply, state, casual),
                Step::Reprocess => {
                    depth += 1;
                    if depth >= MAX_REPROCESS_DEPTH {
                        warn!(
                            user_id = %msg.user_id,
                            "reprocess depth exhausted, falling back"
                        );
                        break (
                            Reply::text(responses::APOLOGY),
                            ConversationState::Idle,
                            false,
                        );
                    }
                    debug!(depth, "re-entering pipeline as new input");
                    state = ConversationState::Idle;
                    context.clear_transient();
                }
            }
        };

        // Post-action bookkeeping: remember the user text for
        // back-references, persist state+context as a unit, persist the
        // assistant reply, and (re)schedule the auto-close.
        if msg.callback_data.is_none() && remember_for_back_reference(text) {
            context.last_user_text = Some(text.to_string());
        }
        self.storage
            .update_conversation(&conversation.id, &final_state.to_string(), &context.to_json())
            .await?;

        if !reply.is_empty() {
            self.append_assistant_message(&conversation, &reply).await?;
        }

        if final_state == ConversationState::Idle && !casual {
            self.closer.schedule(&conversation.id);
        }

        Ok(reply)
    }

    /// Find-or-create the user's single active conversation, defensively
    /// resetting stale non-idle conversations whose close job was lost.
    async fn resolve_conversation(
        &self,
        user_id: &str,
    ) -> Result<ConversationRecord, LembraError> {
        match self.storage.active_conversation(user_id).await? {
            Some(conversation) if conversation.state == "closed" => {
                // A closed conversation cannot stay active: replace it.
                self.storage.create_conversation(user_id).await
            }
            Some(mut conversation) => {
                let stale = chrono::DateTime::parse_from_rfc3339(&conversation.updated_at)
                    .map(|t| Utc::now() - t.with_timezone(&Utc) > self.stale_after)
                    .unwrap_or(false);
                if stale && conversation.state != "idle" {
                    info!(conversation_id = %conversation.id, "stale conversation, resetting to idle");
                    conversation.state = "idle".to_string();
                    conversation.context = ConversationContext::default().to_json();
                    self.storage
                        .update_conversation(&conversation.id, "idle", &conversation.context)
                        .await?;
                }
                Ok(conversation)
            }
            None => self.storage.create_conversation(user_id).await,
        }
    }

    async fn append_user_message(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
    ) -> Result<bool, LembraError> {
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            role: "user".to_string(),
            content: if msg.text.is_empty() {
                msg.callback_data.clone().unwrap_or_default()
            } else {
                msg.text.clone()
            },
            provider: Some(msg.provider.to_string()),
            external_id: Some(msg.external_id.clone()),
            provider_message_id: Some(msg.message_id.clone()),
            provider_payload: None,
            created_at: Utc::now().to_rfc3339(),
        };
        self.storage.append_message(&record).await
    }

    async fn append_assistant_message(
        &self,
        conversation: &ConversationRecord,
        reply: &Reply,
    ) -> Result<(), LembraError> {
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            role: "assistant".to_string(),
            content: reply.text.clone(),
            provider: None,
            external_id: None,
            provider_message_id: None,
            provider_payload: None,
            created_at: Utc::now().to_rfc3339(),
        };
        self.storage.append_message(&record).await.map(|_| ())
    }

    fn tool_context(&self, msg: &IncomingMessage, conversation: &ConversationRecord) -> ToolContext {
        ToolContext {
            user_id: msg.user_id.clone(),
            conversation_id: conversation.id.clone(),
            provider: msg.provider,
            external_id: msg.external_id.clone(),
        }
    }

    async fn dispatch(
        &self,
        msg: &IncomingMessage,
        state: ConversationState,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        debug!(state = %state, user_id = %msg.user_id, "dispatching");
        match state {
            ConversationState::AwaitingConfirmation => {
                self.handle_awaiting_confirmation(msg, context, conversation).await
            }
            ConversationState::AwaitingFinalConfirmation => {
                self.handle_final_confirmation(msg, context, conversation).await
            }
            ConversationState::AwaitingContext => {
                self.handle_clarification(msg, context, conversation).await
            }
            ConversationState::AwaitingBatchItem => {
                self.handle_batch_reply(msg, context, conversation).await
            }
            ConversationState::OffTopicChat => self.handle_off_topic(msg, context, conversation).await,
            ConversationState::Idle
            | ConversationState::Processing
            | ConversationState::Closed => self.handle_idle(msg, context, conversation).await,
        }
    }

    // --- Idle pipeline ---

    async fn handle_idle(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        // A stale button tap with no pending flow: acknowledge silently.
        if msg.callback_data.is_some() && msg.text.trim().is_empty() {
            return Ok(Step::reply(Reply::default(), ConversationState::Idle));
        }

        // Start command: greet. The linking token (if any) rides on the
        // message for the account-linking collaborator.
        if msg.text.trim_start().starts_with("/start") {
            if let Some(ref token) = msg.linking_token {
                debug!(user_id = %msg.user_id, token = %token, "start command with linking token");
            }
            return Ok(Step::casual(Reply::text(format!(
                "Oi! Eu sou {} — me manda filmes, séries, vídeos, links e notas que eu guardo tudo pra você.",
                self.assistant_name
            ))));
        }

        let intent = self.classifier.classify(&msg.text).await;
        let decision = decide_action(&intent, ConversationState::Idle);
        debug!(intent = %intent.intent, action = %intent.action, ?decision, "idle dispatch");

        match decision {
            Decision::SaveContent => self.handle_save(msg, context, conversation, &intent).await,
            Decision::SavePrevious => self.handle_save_previous(msg, context, conversation).await,
            Decision::Search => {
                let args = serde_json::json!({ "query": intent.entities.query });
                let outcome = self
                    .tools
                    .execute(ToolName::SearchItems, &self.tool_context(msg, conversation), args)
                    .await?;
                Ok(Step::reply(
                    Reply::text(outcome.message.unwrap_or_else(|| "Nada por aqui.".to_string())),
                    ConversationState::Idle,
                ))
            }
            Decision::DeleteAll => {
                let outcome = self
                    .tools
                    .execute(
                        ToolName::DeleteAllMemories,
                        &self.tool_context(msg, conversation),
                        serde_json::json!({}),
                    )
                    .await?;
                Ok(Step::reply(
                    Reply::text(outcome.message.unwrap_or_else(|| "Feito!".to_string())),
                    ConversationState::Idle,
                ))
            }
            Decision::DeleteItem => {
                self.handle_delete_selected(msg, conversation, &intent).await
            }
            Decision::DeleteByQuery => {
                let Some(query) = intent.entities.query.clone() else {
                    return Ok(Step::reply(
                        Reply::text("O que você quer que eu apague?"),
                        ConversationState::Idle,
                    ));
                };
                let outcome = self
                    .tools
                    .execute(
                        ToolName::DeleteMemory,
                        &self.tool_context(msg, conversation),
                        serde_json::json!({ "query": query }),
                    )
                    .await?;
                let text = if outcome.success {
                    outcome.message.unwrap_or_else(|| "Apagado!".to_string())
                } else {
                    format!("Não achei nada parecido com \"{query}\" pra apagar.")
                };
                Ok(Step::reply(Reply::text(text), ConversationState::Idle))
            }
            Decision::GetName => {
                let outcome = self
                    .tools
                    .execute(
                        ToolName::GetAssistantName,
                        &self.tool_context(msg, conversation),
                        serde_json::json!({}),
                    )
                    .await?;
                Ok(Step::reply(
                    Reply::text(
                        outcome
                            .message
                            .unwrap_or_else(|| format!("Me chamo {}!", self.assistant_name)),
                    ),
                    ConversationState::Idle,
                ))
            }
            Decision::UpdateSettings => {
                let Some(target) = intent.entities.target.clone() else {
                    return Ok(Step::reply(
                        Reply::text("Como você quer me chamar?"),
                        ConversationState::Idle,
                    ));
                };
                let outcome = self
                    .tools
                    .execute(
                        ToolName::UpdateUserSettings,
                        &self.tool_context(msg, conversation),
                        serde_json::json!({ "assistant_name": target }),
                    )
                    .await?;
                let text = outcome
                    .message
                    .unwrap_or_else(|| "Não consegui mudar isso agora.".to_string());
                Ok(Step::reply(Reply::text(text), ConversationState::Idle))
            }
            Decision::Casual => Ok(Step::casual(Reply::text(responses::casual()))),
            Decision::Clarify => self.start_clarification(msg, context),
            Decision::Planner => self.handle_planner(msg, conversation).await,
            // decide_action only yields these for pending states.
            Decision::HandleConfirmation | Decision::HandleDenial => {
                Ok(Step::casual(Reply::text(responses::casual())))
            }
        }
    }

    fn start_clarification(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
    ) -> Result<Step, LembraError> {
        let options = self.tools.enabled_save_tools();
        if options.is_empty() {
            // Nothing to offer: stay idle with a deflection.
            return Ok(Step::reply(
                Reply::text(responses::deflection()),
                ConversationState::Idle,
            ));
        }
        context.apply(ContextPatch {
            pending_content: Some(msg.text.trim().to_string()),
            pending_query: Some(msg.text.trim().to_string()),
            clarification_attempts: Some(0),
            ..Default::default()
        });
        Ok(Step::reply(
            clarify::clarification_reply(&options, false),
            ConversationState::AwaitingContext,
        ))
    }

    async fn handle_save(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
        intent: &IntentResult,
    ) -> Result<Step, LembraError> {
        let query = intent
            .entities
            .query
            .clone()
            .unwrap_or_else(|| msg.text.trim().to_string());
        let item_type = intent
            .entities
            .item_type
            .or(intent.entities.url.as_ref().map(|_| ItemType::Link));

        let Some(item_type) = item_type else {
            return self.start_clarification(msg, context);
        };

        // Multiple titles in one save request start the batch sub-protocol.
        // Gated on an explicit plural type word or comma list so titles
        // that merely contain "e" ("A Bela e a Fera") stay whole.
        if item_type.is_enrichable() && batch_requested(&msg.text) {
            let titles = split_batch_titles(&query);
            if titles.len() > 1 {
                context.batch = titles
                    .into_iter()
                    .map(|t| BatchItem {
                        query: t,
                        item_type,
                        status: BatchStatus::Pending,
                    })
                    .collect();
                return self.advance_batch(msg, context, conversation).await;
            }
        }

        match item_type {
            ItemType::Note => {
                self.save_note(msg, conversation, &query, msg.text.trim()).await
            }
            ItemType::Link => {
                let url = intent
                    .entities
                    .url
                    .clone()
                    .unwrap_or_else(|| query.clone());
                self.save_link(msg, conversation, &query, &url).await
            }
            _ => {
                let clean = strip_type_words(&query);
                self.enrichment_flow(msg, context, conversation, item_type, &clean)
                    .await
            }
        }
    }

    async fn handle_save_previous(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        let Some(previous) = context.last_user_text.clone() else {
            return Ok(Step::reply(
                Reply::text(responses::NOTHING_TO_SAVE),
                ConversationState::Idle,
            ));
        };
        if let Some(url) = lembra_intent::entities::extract_url(&previous) {
            return self.save_link(msg, conversation, &previous, &url).await;
        }
        self.save_note(msg, conversation, &previous, &previous).await
    }

    /// Delete by 1-based position against the user's most recent items.
    async fn handle_delete_selected(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
        intent: &IntentResult,
    ) -> Result<Step, LembraError> {
        let selections = &intent.entities.selections;
        if selections.is_empty() {
            return Ok(Step::reply(
                Reply::text("Qual item você quer apagar? Me diz o número da lista."),
                ConversationState::Idle,
            ));
        }

        let listing = self
            .tools
            .execute(
                ToolName::SearchItems,
                &self.tool_context(msg, conversation),
                serde_json::json!({ "limit": 10 }),
            )
            .await?;
        let items: Vec<MemoryItemRecord> = listing
            .data
            .and_then(|d| serde_json::from_value(d).ok())
            .unwrap_or_default();
        if items.is_empty() {
            return Ok(Step::reply(
                Reply::text("Você não tem nada salvo pra apagar."),
                ConversationState::Idle,
            ));
        }

        let mut deleted = Vec::new();
        for n in selections {
            let Some(item) = items.get(n - 1) else {
                continue;
            };
            let outcome = self
                .tools
                .execute(
                    ToolName::DeleteMemory,
                    &self.tool_context(msg, conversation),
                    serde_json::json!({ "item_id": item.id }),
                )
                .await?;
            if outcome.success {
                deleted.push(item.title.clone());
            }
        }

        let text = if deleted.is_empty() {
            "Esses números não batem com a sua lista. Pede pra eu listar de novo!".to_string()
        } else {
            format!("Apaguei: {}.", deleted.join(", "))
        };
        Ok(Step::reply(Reply::text(text), ConversationState::Idle))
    }

    async fn save_note(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
        title_source: &str,
        content: &str,
    ) -> Result<Step, LembraError> {
        let args = serde_json::json!({
            "title": truncate_title(title_source),
            "content": content,
        });
        let outcome = self
            .tools
            .execute(ToolName::SaveNote, &self.tool_context(msg, conversation), args)
            .await?;
        Ok(Step::reply(
            Reply::text(
                outcome
                    .message
                    .unwrap_or_else(|| "Anotado!".to_string()),
            ),
            ConversationState::Idle,
        ))
    }

    async fn save_link(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
        title_source: &str,
        url: &str,
    ) -> Result<Step, LembraError> {
        let title = if title_source.trim() == url {
            url.to_string()
        } else {
            truncate_title(title_source)
        };
        let args = serde_json::json!({ "title": title, "url": url });
        let outcome = self
            .tools
            .execute(ToolName::SaveLink, &self.tool_context(msg, conversation), args)
            .await?;
        Ok(Step::reply(
            Reply::text(outcome.message.unwrap_or_else(|| "Link salvo!".to_string())),
            ConversationState::Idle,
        ))
    }

    /// The disambiguation entry point: 0 candidates save bare, 1 goes
    /// straight to final confirmation, 2..7 show the numbered list.
    async fn enrichment_flow(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
        item_type: ItemType,
        query: &str,
    ) -> Result<Step, LembraError> {
        let candidates = match self.enrichment.search(item_type, query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, query, "enrichment failed, saving bare");
                return self.save_bare(msg, conversation, item_type, query).await;
            }
        };

        if candidates.is_empty() {
            return self.save_bare(msg, conversation, item_type, query).await;
        }

        if candidates.len() == 1 {
            let candidate = candidates.into_iter().next().expect("len checked");
            let reply = candidates::final_confirmation_reply(&candidate);
            context.apply(ContextPatch {
                pending_query: Some(query.to_string()),
                pending_item_type: Some(item_type),
                selected: Some(candidate),
                candidates: Some(Vec::new()),
                ..Default::default()
            });
            return Ok(Step::reply(reply, ConversationState::AwaitingFinalConfirmation));
        }

        let capped = candidates::cap_candidates(candidates);
        let reply = candidates::candidate_list_reply(query, &capped);
        context.apply(ContextPatch {
            pending_query: Some(query.to_string()),
            pending_item_type: Some(item_type),
            candidates: Some(capped),
            ..Default::default()
        });
        context.selected = None;
        Ok(Step::reply(reply, ConversationState::AwaitingConfirmation))
    }

    /// Save without metadata and tell the user enrichment came up empty.
    async fn save_bare(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
        item_type: ItemType,
        query: &str,
    ) -> Result<Step, LembraError> {
        let tool = ToolName::for_item_type(item_type);
        let args = serde_json::json!({ "title": truncate_title(query) });
        let outcome = self
            .tools
            .execute(tool, &self.tool_context(msg, conversation), args)
            .await?;
        let text = if outcome.success {
            responses::saved_without_enrichment(query)
        } else {
            outcome
                .message
                .unwrap_or_else(|| responses::APOLOGY.to_string())
        };
        Ok(Step::reply(Reply::text(text), ConversationState::Idle))
    }

    // --- Candidate confirmation states ---

    async fn handle_awaiting_confirmation(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        if context.candidates.is_empty() {
            return Ok(Step::Reprocess);
        }

        match candidates::resolve_selection(msg, &context.candidates) {
            SelectionOutcome::Picked(index) => {
                let candidate = context.candidates[index].clone();
                let reply = candidates::final_confirmation_reply(&candidate);
                context.selected = Some(candidate);
                Ok(Step::reply(reply, ConversationState::AwaitingFinalConfirmation))
            }
            SelectionOutcome::Narrowed(indices) => {
                let narrowed: Vec<_> = indices
                    .into_iter()
                    .filter_map(|i| context.candidates.get(i).cloned())
                    .collect();
                let query = context.pending_query.clone().unwrap_or_default();
                let reply = candidates::candidate_list_reply(&query, &narrowed);
                context.candidates = narrowed;
                Ok(Step::reply(reply, ConversationState::AwaitingConfirmation))
            }
            SelectionOutcome::NewRequest => {
                let intent = self.classifier.classify(&msg.text).await;
                match decide_action(&intent, ConversationState::AwaitingConfirmation) {
                    Decision::HandleDenial => {
                        context.clear_transient();
                        Ok(Step::reply(
                            Reply::text(responses::CANCELLED),
                            ConversationState::Idle,
                        ))
                    }
                    Decision::HandleConfirmation => {
                        // A bare "sim" against a list is still ambiguous.
                        Ok(Step::reply(
                            Reply::text("Qual deles? Me responde com o número!"),
                            ConversationState::AwaitingConfirmation,
                        ))
                    }
                    _ => Ok(Step::Reprocess),
                }
            }
        }
    }

    async fn handle_final_confirmation(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        let Some(selected) = context.selected.clone() else {
            return Ok(Step::Reprocess);
        };

        if msg.callback_data.as_deref() == Some(CALLBACK_CONFIRM_FINAL) {
            return self.commit_selected(msg, context, conversation, &selected).await;
        }
        if msg.callback_data.as_deref() == Some(CALLBACK_CHOOSE_AGAIN) {
            if context.candidates.is_empty() {
                return Ok(Step::Reprocess);
            }
            let query = context.pending_query.clone().unwrap_or_default();
            let reply = candidates::candidate_list_reply(&query, &context.candidates);
            context.selected = None;
            return Ok(Step::reply(reply, ConversationState::AwaitingConfirmation));
        }

        let intent = self.classifier.classify(&msg.text).await;
        match decide_action(&intent, ConversationState::AwaitingFinalConfirmation) {
            Decision::HandleConfirmation => {
                self.commit_selected(msg, context, conversation, &selected).await
            }
            Decision::HandleDenial => {
                if context.candidates.is_empty() {
                    context.clear_transient();
                    return Ok(Step::reply(
                        Reply::text(responses::CANCELLED),
                        ConversationState::Idle,
                    ));
                }
                // "Não é esse": fall back to the list.
                let query = context.pending_query.clone().unwrap_or_default();
                let reply = candidates::candidate_list_reply(&query, &context.candidates);
                context.selected = None;
                Ok(Step::reply(reply, ConversationState::AwaitingConfirmation))
            }
            _ => Ok(Step::Reprocess),
        }
    }

    /// Commit the confirmed candidate through the save tool.
    async fn commit_selected(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
        selected: &lembra_core::types::Candidate,
    ) -> Result<Step, LembraError> {
        let item_type = context.pending_item_type.unwrap_or(ItemType::Movie);
        let step = self
            .save_candidate(msg, conversation, item_type, selected)
            .await?;
        context.clear_transient();
        Ok(step)
    }

    async fn save_candidate(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
        item_type: ItemType,
        candidate: &lembra_core::types::Candidate,
    ) -> Result<Step, LembraError> {
        let url = if item_type == ItemType::Video {
            Some(format!(
                "https://www.youtube.com/watch?v={}",
                candidate.external_id
            ))
        } else {
            None
        };
        let metadata =
            serde_json::to_value(candidate).map_err(|e| LembraError::Internal(e.to_string()))?;
        let args = serde_json::json!({
            "title": candidate.title,
            "url": url,
            "metadata": metadata,
        });
        let outcome = self
            .tools
            .execute(
                ToolName::for_item_type(item_type),
                &self.tool_context(msg, conversation),
                args,
            )
            .await?;
        let text = outcome
            .message
            .unwrap_or_else(|| format!("Salvei \"{}\"!", candidate.title));
        Ok(Step::reply(Reply::text(text), ConversationState::Idle))
    }

    // --- Clarification state ---

    async fn handle_clarification(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        let options = self.tools.enabled_save_tools();
        let intent = self.classifier.classify(&msg.text).await;

        match clarify::resolve_clarification(
            &msg.text,
            msg.callback_data.as_deref(),
            &intent,
            &options,
        ) {
            ClarifyOutcome::Resolved(item_type) => {
                let content = context
                    .pending_content
                    .clone()
                    .unwrap_or_else(|| msg.text.trim().to_string());
                context.clarification_attempts = 0;
                match item_type {
                    ItemType::Note => {
                        let step = self
                            .save_note(msg, conversation, &content, &content)
                            .await?;
                        context.clear_transient();
                        Ok(step)
                    }
                    ItemType::Link => {
                        let url = lembra_intent::entities::extract_url(&content)
                            .unwrap_or_else(|| content.clone());
                        let step = self.save_link(msg, conversation, &content, &url).await?;
                        context.clear_transient();
                        Ok(step)
                    }
                    _ => {
                        let query = strip_type_words(&content);
                        self.enrichment_flow(msg, context, conversation, item_type, &query)
                            .await
                    }
                }
            }
            ClarifyOutcome::Cancelled => {
                context.clear_transient();
                Ok(Step::reply(
                    Reply::text(responses::CANCELLED),
                    ConversationState::Idle,
                ))
            }
            ClarifyOutcome::NewRequest => Ok(Step::Reprocess),
            ClarifyOutcome::Unresolved => {
                let attempts = context.clarification_attempts + 1;
                if attempts >= MAX_CLARIFICATION_ATTEMPTS {
                    info!(user_id = %msg.user_id, "clarification exhausted, going off-topic");
                    context.clear_transient();
                    return Ok(Step::reply(
                        Reply::text(responses::deflection()),
                        ConversationState::OffTopicChat,
                    ));
                }
                context.clarification_attempts = attempts;
                Ok(Step::reply(
                    clarify::clarification_reply(&options, true),
                    ConversationState::AwaitingContext,
                ))
            }
        }
    }

    // --- Off-topic state ---

    async fn handle_off_topic(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        let intent = self.classifier.classify(&msg.text).await;
        if intent.confidence >= 0.85 && intent.intent != lembra_core::types::Intent::Unknown {
            debug!(intent = %intent.intent, "off-topic recovered, back to normal flow");
            context.clear_transient();
            return self.handle_idle(msg, context, conversation).await;
        }
        Ok(Step::Reply {
            reply: Reply::text(responses::deflection()),
            state: ConversationState::OffTopicChat,
            casual: true,
        })
    }

    // --- Batch state ---

    async fn handle_batch_reply(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        let Some(current) = context
            .batch
            .iter()
            .position(|i| i.status == BatchStatus::Processing)
        else {
            return Ok(Step::Reprocess);
        };

        if !context.candidates.is_empty() {
            match candidates::resolve_selection(msg, &context.candidates) {
                SelectionOutcome::Picked(index) => {
                    let candidate = context.candidates[index].clone();
                    let item_type = context.batch[current].item_type;
                    self.save_candidate(msg, conversation, item_type, &candidate)
                        .await?;
                    context.batch[current].status = BatchStatus::Confirmed;
                    context.candidates.clear();
                    return self.advance_batch(msg, context, conversation).await;
                }
                SelectionOutcome::Narrowed(indices) => {
                    let narrowed: Vec<_> = indices
                        .into_iter()
                        .filter_map(|i| context.candidates.get(i).cloned())
                        .collect();
                    let query = context.batch[current].query.clone();
                    let reply = candidates::candidate_list_reply(&query, &narrowed);
                    context.candidates = narrowed;
                    return Ok(Step::reply(reply, ConversationState::AwaitingBatchItem));
                }
                SelectionOutcome::NewRequest => {
                    let intent = self.classifier.classify(&msg.text).await;
                    if decide_action(&intent, ConversationState::AwaitingBatchItem)
                        == Decision::HandleDenial
                    {
                        context.batch[current].status = BatchStatus::Skipped;
                        context.candidates.clear();
                        return self.advance_batch(msg, context, conversation).await;
                    }
                    // Keep the batch alive: re-show the current item.
                    let query = context.batch[current].query.clone();
                    let reply = candidates::candidate_list_reply(&query, &context.candidates);
                    return Ok(Step::reply(reply, ConversationState::AwaitingBatchItem));
                }
            }
        }

        Ok(Step::Reprocess)
    }

    /// Advance the batch queue: auto-resolve single-match and zero-match
    /// items, stop only when an item needs the user.
    async fn advance_batch(
        &self,
        msg: &IncomingMessage,
        context: &mut ConversationContext,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        while let Some(index) = context.next_pending_batch() {
            context.batch[index].status = BatchStatus::Processing;
            let item_type = context.batch[index].item_type;
            let query = context.batch[index].query.clone();

            let candidates = match self.enrichment.search(item_type, &query).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, query = %query, "batch enrichment failed, saving bare");
                    Vec::new()
                }
            };

            match candidates.len() {
                0 => {
                    self.save_bare(msg, conversation, item_type, &query).await?;
                    context.batch[index].status = BatchStatus::Confirmed;
                }
                1 => {
                    let candidate = candidates.into_iter().next().expect("len checked");
                    self.save_candidate(msg, conversation, item_type, &candidate)
                        .await?;
                    context.batch[index].status = BatchStatus::Confirmed;
                }
                _ => {
                    let capped = candidates::cap_candidates(candidates);
                    let position = context
                        .batch
                        .iter()
                        .filter(|i| {
                            matches!(i.status, BatchStatus::Confirmed | BatchStatus::Skipped)
                        })
                        .count()
                        + 1;
                    let total = context.batch.len();
                    let mut reply = candidates::candidate_list_reply(&query, &capped);
                    reply.text = format!("({position}/{total}) {}", reply.text);
                    context.candidates = capped;
                    context.pending_item_type = Some(item_type);
                    context.pending_query = Some(query);
                    return Ok(Step::reply(reply, ConversationState::AwaitingBatchItem));
                }
            }
        }

        // Queue drained: summarize and go idle.
        let confirmed = context
            .batch
            .iter()
            .filter(|i| i.status == BatchStatus::Confirmed)
            .count();
        let skipped = context
            .batch
            .iter()
            .filter(|i| i.status == BatchStatus::Skipped)
            .count();
        context.clear_transient();
        let summary = if skipped == 0 {
            format!("Prontinho! Salvei {confirmed} item(ns).")
        } else {
            format!("Feito: {confirmed} salvo(s), {skipped} pulado(s).")
        };
        Ok(Step::reply(Reply::text(summary), ConversationState::Idle))
    }

    // --- Planner delegation ---

    async fn handle_planner(
        &self,
        msg: &IncomingMessage,
        conversation: &ConversationRecord,
    ) -> Result<Step, LembraError> {
        let Some(ref llm) = self.llm else {
            return Ok(Step::reply(
                Reply::text(responses::deflection()),
                ConversationState::Idle,
            ));
        };

        let mut enabled: Vec<ToolName> = self.tools.enabled_save_tools();
        enabled.extend([
            ToolName::SearchItems,
            ToolName::DeleteMemory,
            ToolName::DeleteAllMemories,
            ToolName::GetAssistantName,
            ToolName::UpdateUserSettings,
        ]);

        let history = self
            .storage
            .recent_messages(&conversation.id, PLANNER_HISTORY)
            .await?;
        let prompt = planner::planner_prompt(&self.assistant_name, &enabled, msg.text.trim());

        let raw = match llm
            .complete(&prompt, &planner::history_from_transcript(&history))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "planner call failed");
                return Ok(Step::reply(
                    Reply::text(responses::APOLOGY),
                    ConversationState::Idle,
                ));
            }
        };

        let action = match planner::parse_planner_action(&raw) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, raw = %truncate_log(&raw), "planner output rejected");
                return Ok(Step::reply(
                    Reply::text(responses::APOLOGY),
                    ConversationState::Idle,
                ));
            }
        };

        match action {
            PlannerAction::CallTool { name, args } => {
                if !self.tools.is_enabled(name) {
                    return Ok(Step::reply(
                        Reply::text(responses::APOLOGY),
                        ConversationState::Idle,
                    ));
                }
                let outcome = self
                    .tools
                    .execute(name, &self.tool_context(msg, conversation), args)
                    .await?;
                let text = if outcome.success {
                    outcome.message.unwrap_or_else(|| "Feito!".to_string())
                } else {
                    outcome
                        .message
                        .unwrap_or_else(|| "Hmm, não consegui fazer isso agora.".to_string())
                };
                Ok(Step::reply(Reply::text(text), ConversationState::Idle))
            }
            PlannerAction::Respond { text } => {
                Ok(Step::reply(Reply::text(text), ConversationState::Idle))
            }
            PlannerAction::Noop => Ok(Step::reply(Reply::default(), ConversationState::Idle)),
        }
    }
}

/// Whether a message is substantive enough to be the target of a later
/// "save the previous thing" reference. Control words (yes/no/cancel),
/// bare numbers, and the back-references themselves are not.
fn remember_for_back_reference(text: &str) -> bool {
    if text.is_empty() || lembra_intent::entities::is_save_previous_reference(text) {
        return false;
    }
    if lembra_intent::entities::extract_url(text).is_some() {
        return true;
    }
    text.split_whitespace().count() >= 3
}

/// True when the message asks to save several items at once: a plural
/// type word ("filmes", "séries") or a comma-separated list.
fn batch_requested(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains(',')
        || lower
            .split_whitespace()
            .any(|w| matches!(w, "filmes" | "séries" | "series" | "vídeos" | "videos"))
}

/// Split a save query like "interestelar e akira" into batch titles.
fn split_batch_titles(query: &str) -> Vec<String> {
    query
        .split([','])
        .flat_map(|part| part.split(" e "))
        .map(|part| strip_type_words(part.trim()))
        .filter(|part| part.chars().count() >= 2)
        .collect()
}

/// Drop leading item-type words ("filme", "série"...) from a query.
fn strip_type_words(query: &str) -> String {
    let words: Vec<&str> = query
        .split_whitespace()
        .skip_while(|w| {
            matches!(
                w.to_lowercase().as_str(),
                "filme" | "filmes" | "série" | "series" | "séries" | "serie" | "vídeo"
                    | "video" | "vídeos" | "videos" | "nota" | "notas" | "link" | "links"
                    | "o" | "a" | "os" | "as"
            )
        })
        .collect();
    if words.is_empty() {
        query.trim().to_string()
    } else {
        words.join(" ")
    }
}

/// Title column cap for bare/note saves.
fn truncate_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= 80 {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(80).collect();
        format!("{cut}…")
    }
}

fn truncate_log(raw: &str) -> String {
    raw.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_batch_titles_handles_separators() {
        assert_eq!(
            split_batch_titles("interestelar e akira"),
            vec!["interestelar".to_string(), "akira".to_string()]
        );
        assert_eq!(
            split_batch_titles("interestelar, akira e matrix"),
            vec![
                "interestelar".to_string(),
                "akira".to_string(),
                "matrix".to_string()
            ]
        );
        assert_eq!(split_batch_titles("interestelar"), vec!["interestelar".to_string()]);
    }

    #[test]
    fn strip_type_words_cleans_queries() {
        assert_eq!(strip_type_words("filme interestelar"), "interestelar");
        assert_eq!(strip_type_words("o filme interestelar"), "interestelar");
        assert_eq!(strip_type_words("interestelar"), "interestelar");
        // All type words: fall back to the raw query.
        assert_eq!(strip_type_words("filme"), "filme");
    }

    #[test]
    fn back_reference_memory_skips_control_words() {
        assert!(!remember_for_back_reference("sim"));
        assert!(!remember_for_back_reference("cancela"));
        assert!(!remember_for_back_reference("3"));
        assert!(!remember_for_back_reference("salva isso"));
        assert!(remember_for_back_reference("https://exemplo.com/artigo"));
        assert!(remember_for_back_reference("uma ideia longa o bastante"));
    }

    #[test]
    fn truncate_title_caps_long_text() {
        let long = "x".repeat(200);
        let truncated = truncate_title(&long);
        assert!(truncated.chars().count() <= 81);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_title("curto"), "curto");
    }
}
