// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The clarification sub-protocol.
//!
//! When the classifier cannot resolve an intent confidently, the user gets
//! a menu built from the currently-enabled save tools (never hard-coded),
//! with cancel always shown last. Replies resolve by explicit number,
//! natural-language type words, or escape out entirely when the reply is a
//! new question/command. After [`MAX_CLARIFICATION_ATTEMPTS`] unresolved
//! rounds the conversation degrades to off-topic chat instead of looping.

use lembra_core::types::{Button, Intent, IntentAction, IntentResult, ItemType, Reply};
use lembra_intent::entities;
use lembra_tools::ToolName;

/// Unresolved rounds tolerated before degrading to off-topic chat.
pub const MAX_CLARIFICATION_ATTEMPTS: u32 = 4;

/// Callback data for the cancel menu entry.
pub const CALLBACK_CLARIFY_CANCEL: &str = "clarify_cancel";

/// Callback data prefix for menu entries (`clarify_0`, `clarify_1`, ...).
pub const CALLBACK_CLARIFY_PREFIX: &str = "clarify_";

/// How a clarification reply resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ClarifyOutcome {
    /// The user picked an item type.
    Resolved(ItemType),
    /// The user cancelled.
    Cancelled,
    /// The reply is a new question/command; re-enter the idle pipeline.
    NewRequest,
    /// Could not resolve; ask again (or degrade when attempts run out).
    Unresolved,
}

/// Build the clarification menu from the live enabled save tools.
pub fn clarification_reply(options: &[ToolName], retry: bool) -> Reply {
    let mut lines = Vec::new();
    if retry {
        lines.push("Ainda não entendi! Me ajuda escolhendo uma opção:".to_string());
    } else {
        lines.push("Quer que eu guarde isso? Me diz como:".to_string());
    }
    for (i, tool) in options.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, tool.menu_label()));
    }
    lines.push(format!("{}. Cancelar", options.len() + 1));

    let mut buttons: Vec<Vec<Button>> = options
        .chunks(3)
        .enumerate()
        .map(|(row, chunk)| {
            chunk
                .iter()
                .enumerate()
                .map(|(col, tool)| {
                    let index = row * 3 + col;
                    Button::new(
                        tool.menu_label(),
                        format!("{CALLBACK_CLARIFY_PREFIX}{index}"),
                    )
                })
                .collect()
        })
        .collect();
    buttons.push(vec![Button::new("Cancelar", CALLBACK_CLARIFY_CANCEL)]);

    Reply {
        text: lines.join("\n"),
        buttons,
        photo: None,
    }
}

/// Resolve a clarification reply against the current enabled options.
///
/// Numeric text maps only onto the options range `1..=N`; the cancel entry
/// is reached through its button, denial words, or the `N+1` display
/// number is treated as a new request so a changed menu never silently
/// cancels. The classified intent decides the new-request escape.
pub fn resolve_clarification(
    text: &str,
    callback_data: Option<&str>,
    intent: &IntentResult,
    options: &[ToolName],
) -> ClarifyOutcome {
    // Button taps are unambiguous.
    if let Some(data) = callback_data {
        if data == CALLBACK_CLARIFY_CANCEL {
            return ClarifyOutcome::Cancelled;
        }
        if let Some(index) = data
            .strip_prefix(CALLBACK_CLARIFY_PREFIX)
            .and_then(|s| s.parse::<usize>().ok())
        {
            if let Some(tool) = options.get(index) {
                if let Some(item_type) = tool.save_item_type() {
                    return ClarifyOutcome::Resolved(item_type);
                }
            }
            return ClarifyOutcome::NewRequest;
        }
    }

    if intent.intent == Intent::Denial {
        return ClarifyOutcome::Cancelled;
    }

    let trimmed = text.trim();
    let word_count = trimmed.split_whitespace().count();

    // Explicit numeric choice against the *current* options list.
    let selections = entities::extract_selections(trimmed);
    if selections.len() == 1 && word_count <= 3 {
        let n = selections[0];
        if n >= 1 && n <= options.len() {
            if let Some(item_type) = options[n - 1].save_item_type() {
                return ClarifyOutcome::Resolved(item_type);
            }
        }
        // Out of range (including a stale cancel position): reprocess.
        return ClarifyOutcome::NewRequest;
    }

    // Natural-language type words ("é um filme", "nota").
    if let Some(item_type) = entities::extract_item_type(trimmed) {
        if options
            .iter()
            .any(|t| t.save_item_type() == Some(item_type))
        {
            return ClarifyOutcome::Resolved(item_type);
        }
    }

    // A reply that classifies as a real command/question is a new request,
    // not a failed clarification.
    if intent.intent != Intent::Unknown
        && !matches!(intent.action, IntentAction::Confirm | IntentAction::CasualChat)
        && intent.confidence >= 0.6
    {
        return ClarifyOutcome::NewRequest;
    }
    if trimmed.ends_with('?') && word_count >= 3 {
        return ClarifyOutcome::NewRequest;
    }

    ClarifyOutcome::Unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use lembra_core::types::Entities;

    const OPTIONS: &[ToolName] = &[ToolName::SaveNote, ToolName::SaveMovie];

    fn unknown_intent() -> IntentResult {
        IntentResult::unknown()
    }

    fn intent_of(intent: Intent, action: IntentAction, confidence: f32) -> IntentResult {
        IntentResult {
            intent,
            action,
            confidence,
            entities: Entities::default(),
        }
    }

    #[test]
    fn menu_lists_options_with_cancel_last() {
        let reply = clarification_reply(OPTIONS, false);
        assert!(reply.text.contains("1. Nota"));
        assert!(reply.text.contains("2. Filme"));
        assert!(reply.text.contains("3. Cancelar"));
        let last_row = reply.buttons.last().unwrap();
        assert_eq!(last_row[0].callback_data, CALLBACK_CLARIFY_CANCEL);
    }

    #[test]
    fn numeric_choice_resolves_type() {
        assert_eq!(
            resolve_clarification("2", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::Resolved(ItemType::Movie)
        );
        assert_eq!(
            resolve_clarification("1", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::Resolved(ItemType::Note)
        );
    }

    #[test]
    fn out_of_range_number_is_a_new_request() {
        // Two options + cancel on display; "3" is outside the options range
        // and re-enters the pipeline instead of erroring.
        assert_eq!(
            resolve_clarification("3", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::NewRequest
        );
    }

    #[test]
    fn cancel_button_cancels() {
        assert_eq!(
            resolve_clarification("", Some(CALLBACK_CLARIFY_CANCEL), &unknown_intent(), OPTIONS),
            ClarifyOutcome::Cancelled
        );
    }

    #[test]
    fn clarify_button_resolves() {
        assert_eq!(
            resolve_clarification("", Some("clarify_1"), &unknown_intent(), OPTIONS),
            ClarifyOutcome::Resolved(ItemType::Movie)
        );
    }

    #[test]
    fn denial_cancels() {
        let deny = intent_of(Intent::Denial, IntentAction::Deny, 0.95);
        assert_eq!(
            resolve_clarification("deixa", None, &deny, OPTIONS),
            ClarifyOutcome::Cancelled
        );
    }

    #[test]
    fn type_word_resolves() {
        assert_eq!(
            resolve_clarification("é um filme", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::Resolved(ItemType::Movie)
        );
    }

    #[test]
    fn type_word_for_disabled_tool_does_not_resolve() {
        // "vídeo" is not among the enabled options.
        assert_eq!(
            resolve_clarification("um vídeo", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::Unresolved
        );
    }

    #[test]
    fn new_command_escapes() {
        let search = intent_of(Intent::SearchContent, IntentAction::SearchItems, 0.85);
        assert_eq!(
            resolve_clarification("lista meus filmes", None, &search, OPTIONS),
            ClarifyOutcome::NewRequest
        );
    }

    #[test]
    fn question_escapes() {
        assert_eq!(
            resolve_clarification("que horas são agora?", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::NewRequest
        );
    }

    #[test]
    fn mumbling_stays_unresolved() {
        assert_eq!(
            resolve_clarification("hmm sei lá", None, &unknown_intent(), OPTIONS),
            ClarifyOutcome::Unresolved
        );
    }
}
