// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-backed intent classification.
//!
//! Second tier of the cascade: a fixed instruction prompt asks the model
//! for one strict JSON object. Reasoning-model wrapper tags and code
//! fences are stripped before parsing, and the parse itself is strict —
//! unknown fields or unknown intent/action strings reject the output so
//! the cascade can fall through to the regex tier.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use lembra_core::types::{Entities, Intent, IntentAction, IntentResult, ItemType};
use lembra_core::{LembraError, LlmProvider};

use crate::entities;

/// Instruction prompt for the classifier call. The response contract is a
/// single JSON object and nothing else.
const CLASSIFIER_PROMPT: &str = "\
Você é um classificador de intenções para um assistente de memória pessoal.
Classifique a mensagem do usuário e responda com UM único objeto JSON, sem
texto adicional, no formato:
{\"intent\": \"...\", \"action\": \"...\", \"confidence\": 0.0, \"entities\": {\"query\": null, \"item_type\": null, \"url\": null, \"target\": null}}

intents: save_content, search_content, delete_content, confirmation, denial, settings, info, casual, unknown
actions: save_content, save_previous, search_items, delete_all, delete_item, delete_by_query, confirm, deny, get_name, update_settings, info_request, casual_chat, unknown
item_type (opcional): note, movie, tv_show, video, link

Mensagem do usuário:
";

/// Strict DTO for the model's JSON answer. Unknown fields reject the parse.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmIntentDto {
    intent: String,
    action: String,
    confidence: f32,
    #[serde(default)]
    entities: LlmEntitiesDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmEntitiesDto {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    item_type: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

/// Strip reasoning-model wrapper tags and code fences, then isolate the
/// outermost JSON object.
///
/// Returns `None` when no braces survive — callers treat that as a parse
/// failure, not an error.
pub fn extract_json_block(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_string();

    // Drop <think>/<reasoning> blocks some models wrap around answers.
    for tag in ["think", "reasoning", "thinking"] {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        while let (Some(start), Some(end)) = (text.find(&open), text.find(&close)) {
            if end > start {
                text.replace_range(start..end + close.len(), "");
            } else {
                break;
            }
        }
    }

    // Drop markdown code fences.
    let text = text.replace("```json", "").replace("```", "");

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Classifier tier backed by an [`LlmProvider`].
pub struct LlmIntentClassifier {
    provider: Arc<dyn LlmProvider>,
}

impl LlmIntentClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Classify via the model. Errors (transport or parse) propagate so the
    /// cascade can fall through; they are never user-visible.
    pub async fn classify(&self, text: &str) -> Result<IntentResult, LembraError> {
        let prompt = format!("{CLASSIFIER_PROMPT}{text}");
        let raw = self.provider.complete(&prompt, &[]).await?;

        let json = extract_json_block(&raw).ok_or_else(|| {
            debug!(raw = %truncate(&raw, 200), "classifier output had no JSON object");
            LembraError::provider("classifier output had no JSON object")
        })?;

        let dto: LlmIntentDto = serde_json::from_str(&json).map_err(|e| {
            debug!(error = %e, raw = %truncate(&json, 200), "classifier JSON rejected");
            LembraError::provider(format!("classifier JSON rejected: {e}"))
        })?;

        let intent = Intent::from_str(&dto.intent)
            .map_err(|_| LembraError::provider(format!("unknown intent `{}`", dto.intent)))?;
        let action = IntentAction::from_str(&dto.action)
            .map_err(|_| LembraError::provider(format!("unknown action `{}`", dto.action)))?;

        let mut result = IntentResult {
            intent,
            action,
            confidence: dto.confidence.clamp(0.0, 1.0),
            entities: Entities {
                query: dto.entities.query,
                selections: Vec::new(),
                item_type: dto
                    .entities
                    .item_type
                    .as_deref()
                    .and_then(|t| ItemType::from_str(t).ok()),
                url: dto.entities.url,
                target: dto.entities.target,
            },
        };
        entities::augment(text, &mut result.entities);
        Ok(result)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
