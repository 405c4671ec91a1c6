// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fast-path intent scoring.
//!
//! Zero-cost lexical classification over the closed intent/action
//! vocabulary. No network, no latency: additive keyword signals per
//! category, the best score wins, and the score maps to a confidence the
//! cascade gates on. Anything the scorer is unsure about falls through to
//! the LLM tier.

use lembra_core::types::{Entities, Intent, IntentAction, IntentResult};

use crate::entities;

/// Confirmation words/phrases (exact match after trim, case-insensitive).
const CONFIRM_EXACT: &[&str] = &[
    "sim", "pode", "confirma", "confirmo", "isso", "exato", "ok", "claro", "beleza",
    "correto", "perfeito", "é esse", "e esse", "é essa", "e essa", "pode ser", "isso mesmo",
];

/// Denial words/phrases (exact match after trim, case-insensitive).
const DENY_EXACT: &[&str] = &[
    "não", "nao", "cancela", "cancelar", "deixa", "esquece", "errado", "nenhum",
    "nenhuma", "não é esse", "nao e esse", "para", "melhor não", "melhor nao",
];

/// Save verbs (word match).
const SAVE_VERBS: &[&str] = &[
    "salva", "salvar", "salve", "guarda", "guardar", "anota", "anotar", "adiciona",
    "adicionar",
];

/// Delete verbs (word match).
const DELETE_VERBS: &[&str] = &[
    "apaga", "apagar", "deleta", "deletar", "remove", "remover", "exclui", "excluir",
];

/// Search verbs (word match).
const SEARCH_VERBS: &[&str] = &[
    "busca", "buscar", "procura", "procurar", "lista", "listar", "mostra", "mostrar",
];

/// Casual greetings/acknowledgments (exact match).
const CASUAL_EXACT: &[&str] = &[
    "oi", "olá", "ola", "bom dia", "boa tarde", "boa noite", "tudo bem", "tudo bem?",
    "valeu", "obrigado", "obrigada", "haha", "kkk", "kkkk", "e aí", "e ai",
];

/// Lexical scorer over the closed intent vocabulary.
pub struct FastClassifier;

impl FastClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one inbound text. Total function: unknown inputs come back
    /// as [`Intent::Unknown`] with low confidence so the cascade continues.
    pub fn classify(&self, text: &str) -> IntentResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return IntentResult::unknown();
        }

        let lower = trimmed.to_lowercase();
        let normalized = lower.trim_end_matches(['!', '.']).trim();

        // Exact-phrase signals resolve immediately with high confidence.
        if CONFIRM_EXACT.contains(&normalized) {
            return result(Intent::Confirmation, IntentAction::Confirm, 0.95, trimmed);
        }
        if DENY_EXACT.contains(&normalized) {
            return result(Intent::Denial, IntentAction::Deny, 0.95, trimmed);
        }
        if CASUAL_EXACT.contains(&normalized) {
            return result(Intent::Casual, IntentAction::CasualChat, 0.9, trimmed);
        }
        if entities::is_save_previous_reference(trimmed) {
            return result(Intent::SaveContent, IntentAction::SavePrevious, 0.92, trimmed);
        }

        // Verb scoring: count word-level hits per category.
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .collect();

        let save_hits = count_hits(&words, SAVE_VERBS);
        let delete_hits = count_hits(&words, DELETE_VERBS);
        let search_hits = count_hits(&words, SEARCH_VERBS);

        if delete_hits > 0 && delete_hits >= save_hits && delete_hits >= search_hits {
            let action = if words.contains(&"tudo") || words.contains(&"todos") || words.contains(&"todas") {
                IntentAction::DeleteAll
            } else if !entities::extract_selections(trimmed).is_empty() {
                IntentAction::DeleteItem
            } else {
                IntentAction::DeleteByQuery
            };
            let mut r = result(Intent::DeleteContent, action, confidence(delete_hits), trimmed);
            r.entities.query = strip_leading_verb(trimmed, DELETE_VERBS);
            return r;
        }

        if search_hits > 0 && search_hits >= save_hits {
            let mut r = result(
                Intent::SearchContent,
                IntentAction::SearchItems,
                confidence(search_hits),
                trimmed,
            );
            r.entities.query = strip_leading_verb(trimmed, SEARCH_VERBS);
            return r;
        }

        if save_hits > 0 {
            let mut r = result(
                Intent::SaveContent,
                IntentAction::SaveContent,
                confidence(save_hits),
                trimmed,
            );
            r.entities.query = strip_leading_verb(trimmed, SAVE_VERBS);
            return r;
        }

        if lower.contains("qual") && lower.contains("nome") {
            return result(Intent::Info, IntentAction::GetName, 0.88, trimmed);
        }

        // A bare URL is a save request even without a verb.
        if entities::extract_url(trimmed).is_some() && words.len() <= 4 {
            return result(Intent::SaveContent, IntentAction::SaveContent, 0.86, trimmed);
        }

        // Nothing decisive: let the LLM tier look at it.
        let mut r = IntentResult::unknown();
        r.confidence = 0.3;
        entities::augment(trimmed, &mut r.entities);
        r
    }
}

impl Default for FastClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn count_hits(words: &[&str], vocab: &[&str]) -> usize {
    words.iter().filter(|w| vocab.contains(*w)).count()
}

fn confidence(hits: usize) -> f32 {
    (0.75 + 0.1 * hits as f32).min(0.95)
}

/// Drop the leading verb (and a following article) from a command so the
/// remainder can serve as the query/content.
fn strip_leading_verb(text: &str, verbs: &[&str]) -> Option<String> {
    let mut words = text.split_whitespace().peekable();
    let first = words.peek()?.to_lowercase();
    if !verbs.contains(&first.as_str()) {
        return Some(text.to_string());
    }
    words.next();
    let rest: Vec<&str> = words
        .skip_while(|w| {
            matches!(
                w.to_lowercase().as_str(),
                "o" | "a" | "os" | "as" | "um" | "uma" | "esse" | "essa" | "este" | "esta"
            )
        })
        .collect();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    }
}

fn result(intent: Intent, action: IntentAction, conf: f32, text: &str) -> IntentResult {
    let mut entities = Entities::default();
    entities::augment(text, &mut entities);
    IntentResult {
        intent,
        action,
        confidence: conf,
        entities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lembra_core::types::ItemType;

    #[test]
    fn classify_confirmation() {
        let c = FastClassifier::new();
        let r = c.classify("sim");
        assert_eq!(r.intent, Intent::Confirmation);
        assert_eq!(r.action, IntentAction::Confirm);
        assert!(r.confidence >= 0.9);
    }

    #[test]
    fn classify_denial() {
        let c = FastClassifier::new();
        assert_eq!(c.classify("não").action, IntentAction::Deny);
        assert_eq!(c.classify("cancela").action, IntentAction::Deny);
    }

    #[test]
    fn classify_save_with_query() {
        let c = FastClassifier::new();
        let r = c.classify("salva o filme interestelar");
        assert_eq!(r.intent, Intent::SaveContent);
        assert_eq!(r.action, IntentAction::SaveContent);
        assert_eq!(r.entities.item_type, Some(ItemType::Movie));
        assert_eq!(r.entities.query.as_deref(), Some("filme interestelar"));
    }

    #[test]
    fn classify_save_previous() {
        let c = FastClassifier::new();
        let r = c.classify("guarda aí");
        assert_eq!(r.action, IntentAction::SavePrevious);
    }

    #[test]
    fn classify_delete_all() {
        let c = FastClassifier::new();
        let r = c.classify("apaga tudo");
        assert_eq!(r.intent, Intent::DeleteContent);
        assert_eq!(r.action, IntentAction::DeleteAll);
    }

    #[test]
    fn classify_delete_selection() {
        let c = FastClassifier::new();
        let r = c.classify("deleta o 2");
        assert_eq!(r.action, IntentAction::DeleteItem);
        assert_eq!(r.entities.selections, vec![2]);
    }

    #[test]
    fn classify_search() {
        let c = FastClassifier::new();
        let r = c.classify("lista meus filmes");
        assert_eq!(r.intent, Intent::SearchContent);
        assert_eq!(r.action, IntentAction::SearchItems);
    }

    #[test]
    fn classify_get_name() {
        let c = FastClassifier::new();
        assert_eq!(c.classify("qual é o seu nome?").action, IntentAction::GetName);
    }

    #[test]
    fn classify_casual() {
        let c = FastClassifier::new();
        assert_eq!(c.classify("bom dia").intent, Intent::Casual);
    }

    #[test]
    fn bare_url_is_save() {
        let c = FastClassifier::new();
        let r = c.classify("https://youtu.be/abc123");
        assert_eq!(r.intent, Intent::SaveContent);
        assert!(r.entities.url.is_some());
    }

    #[test]
    fn free_text_is_unknown_with_low_confidence() {
        let c = FastClassifier::new();
        let r = c.classify("ontem eu vi uma coisa curiosa no centro da cidade");
        assert_eq!(r.intent, Intent::Unknown);
        assert!(r.confidence < 0.85);
    }

    #[test]
    fn empty_is_unknown() {
        let c = FastClassifier::new();
        assert_eq!(c.classify("").intent, Intent::Unknown);
        assert_eq!(c.classify("   ").intent, Intent::Unknown);
    }
}
