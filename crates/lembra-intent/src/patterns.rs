// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic regex fallback classifier.
//!
//! Last tier of the cascade, used when the LLM is unavailable or returned
//! something unparseable. This tier never fails: every input, including
//! empty and non-ASCII text, maps to an [`IntentResult`] with confidence
//! in `[0, 1]` — worst case `unknown` at 0.5.

use std::sync::LazyLock;

use regex::Regex;

use lembra_core::types::{Entities, Intent, IntentAction, IntentResult};

use crate::entities;

static CONFIRM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(sim|pode|confirmo|confirma(r)?|isso( mesmo)?|exato|ok|claro|beleza|correto|perfeito|pode ser)\s*[!.]*\s*$")
        .expect("static regex")
});

static DENY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(n[aã]o|cancela(r)?|deixa( pra l[aá])?|esquece|errado|nenhum(a)?|para|melhor n[aã]o)\s*[!.]*\s*$")
        .expect("static regex")
});

static DELETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(apaga(r)?|deleta(r)?|remove(r)?|exclui(r)?)\b").expect("static regex")
});

static DELETE_ALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(tudo|todos|todas)\b").expect("static regex"));

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(busca(r)?|procura(r)?|lista(r)?|mostra(r)?|quais)\b")
        .expect("static regex")
});

static SAVED_QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)o que (eu )?(salvei|guardei|tenho salvo)").expect("static regex")
});

static SAVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(salva(r)?|salve|guarda(r)?|anota(r)?|adiciona(r)?)\b")
        .expect("static regex")
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(qual .*seu nome|como (voc[eê]|tu) se chama)").expect("static regex")
});

static RENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:te chamar de|seu nome agora [eé]|passa a se chamar)\s+(.{1,40})")
        .expect("static regex")
});

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(oi|ol[aá]|bom dia|boa tarde|boa noite|e a[ií]|tudo bem\??|valeu|obrigad[oa]|k{2,}|haha+)\s*[!.]*\s*$")
        .expect("static regex")
});

/// Deterministic fallback classifier.
pub struct RegexClassifier;

impl RegexClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one inbound text. Total function.
    pub fn classify(&self, text: &str) -> IntentResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return IntentResult::unknown();
        }

        if CONFIRM_RE.is_match(trimmed) {
            return build(Intent::Confirmation, IntentAction::Confirm, 0.9, trimmed);
        }
        if DENY_RE.is_match(trimmed) {
            return build(Intent::Denial, IntentAction::Deny, 0.9, trimmed);
        }

        if DELETE_RE.is_match(trimmed) {
            let selections = entities::extract_selections(trimmed);
            let (action, confidence) = if DELETE_ALL_RE.is_match(trimmed) {
                (IntentAction::DeleteAll, 0.85)
            } else if !selections.is_empty() {
                (IntentAction::DeleteItem, 0.85)
            } else {
                (IntentAction::DeleteByQuery, 0.75)
            };
            let mut r = build(Intent::DeleteContent, action, confidence, trimmed);
            r.entities.query = query_after_match(trimmed, &DELETE_RE);
            return r;
        }

        if SAVED_QUESTION_RE.is_match(trimmed) || SEARCH_RE.is_match(trimmed) {
            let mut r = build(Intent::SearchContent, IntentAction::SearchItems, 0.8, trimmed);
            r.entities.query = query_after_match(trimmed, &SEARCH_RE);
            return r;
        }

        if NAME_RE.is_match(trimmed) {
            return build(Intent::Info, IntentAction::GetName, 0.85, trimmed);
        }

        if let Some(caps) = RENAME_RE.captures(trimmed) {
            let mut r = build(Intent::Settings, IntentAction::UpdateSettings, 0.85, trimmed);
            r.entities.target = Some(
                caps[1]
                    .trim()
                    .trim_matches(['"', '\'', '.', '!'])
                    .to_string(),
            );
            return r;
        }

        if entities::is_save_previous_reference(trimmed) {
            return build(Intent::SaveContent, IntentAction::SavePrevious, 0.9, trimmed);
        }

        if SAVE_RE.is_match(trimmed) || entities::extract_url(trimmed).is_some() {
            let mut r = build(Intent::SaveContent, IntentAction::SaveContent, 0.8, trimmed);
            r.entities.query = query_after_match(trimmed, &SAVE_RE);
            return r;
        }

        if GREETING_RE.is_match(trimmed) {
            return build(Intent::Casual, IntentAction::CasualChat, 0.8, trimmed);
        }

        if trimmed.ends_with('?') {
            return build(Intent::Info, IntentAction::InfoRequest, 0.6, trimmed);
        }

        IntentResult::unknown()
    }
}

impl Default for RegexClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn build(intent: Intent, action: IntentAction, confidence: f32, text: &str) -> IntentResult {
    let mut entities = Entities::default();
    entities::augment(text, &mut entities);
    IntentResult {
        intent,
        action,
        confidence,
        entities,
    }
}

/// Text following the matched verb, stripped of leading articles.
fn query_after_match(text: &str, re: &Regex) -> Option<String> {
    let m = re.find(text)?;
    let rest = text[m.end()..].trim();
    let rest: Vec<&str> = rest
        .split_whitespace()
        .skip_while(|w| {
            matches!(
                w.to_lowercase().as_str(),
                "o" | "a" | "os" | "as" | "um" | "uma" | "esse" | "essa" | "de" | "do" | "da"
            )
        })
        .collect();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lembra_core::types::ItemType;

    #[test]
    fn never_panics_and_confidence_in_range() {
        let c = RegexClassifier::new();
        for input in [
            "",
            "   ",
            "sim",
            "não!!!",
            "apaga tudo agora",
            "🎬🎬🎬",
            "日本語のテキスト",
            "a".repeat(10_000).as_str(),
            "\u{0} null byte",
        ] {
            let r = c.classify(input);
            assert!((0.0..=1.0).contains(&r.confidence), "input: {input:?}");
        }
    }

    #[test]
    fn confirmation_variants() {
        let c = RegexClassifier::new();
        for input in ["sim", "Isso mesmo", "pode ser", "ok!", "confirma"] {
            assert_eq!(c.classify(input).action, IntentAction::Confirm, "{input}");
        }
    }

    #[test]
    fn denial_variants() {
        let c = RegexClassifier::new();
        for input in ["não", "nao", "cancela", "deixa pra lá", "esquece"] {
            assert_eq!(c.classify(input).action, IntentAction::Deny, "{input}");
        }
    }

    #[test]
    fn delete_all_vs_selected_vs_query() {
        let c = RegexClassifier::new();
        assert_eq!(c.classify("apaga tudo").action, IntentAction::DeleteAll);
        let r = c.classify("apaga o 1 e o 3");
        assert_eq!(r.action, IntentAction::DeleteItem);
        assert_eq!(r.entities.selections, vec![1, 3]);
        let r = c.classify("remove a nota da feira");
        assert_eq!(r.action, IntentAction::DeleteByQuery);
        assert_eq!(r.entities.query.as_deref(), Some("nota da feira"));
    }

    #[test]
    fn search_and_list() {
        let c = RegexClassifier::new();
        assert_eq!(c.classify("lista meus filmes").action, IntentAction::SearchItems);
        assert_eq!(
            c.classify("o que eu salvei ontem?").action,
            IntentAction::SearchItems
        );
    }

    #[test]
    fn name_and_rename() {
        let c = RegexClassifier::new();
        assert_eq!(c.classify("qual é o seu nome?").action, IntentAction::GetName);
        let r = c.classify("quero te chamar de Jarvis");
        assert_eq!(r.action, IntentAction::UpdateSettings);
        assert_eq!(r.entities.target.as_deref(), Some("Jarvis"));
    }

    #[test]
    fn save_with_type_and_url() {
        let c = RegexClassifier::new();
        let r = c.classify("salva o filme interestelar");
        assert_eq!(r.action, IntentAction::SaveContent);
        assert_eq!(r.entities.item_type, Some(ItemType::Movie));

        let r = c.classify("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(r.action, IntentAction::SaveContent);
        assert_eq!(r.entities.url.as_deref(), Some("https://youtu.be/dQw4w9WgXcQ"));
    }

    #[test]
    fn save_previous_back_reference() {
        let c = RegexClassifier::new();
        assert_eq!(c.classify("salva isso").action, IntentAction::SavePrevious);
        assert_eq!(c.classify("pode salvar?").action, IntentAction::SavePrevious);
    }

    #[test]
    fn casual_and_question_fallbacks() {
        let c = RegexClassifier::new();
        assert_eq!(c.classify("bom dia").action, IntentAction::CasualChat);
        assert_eq!(
            c.classify("você acha que vai chover?").action,
            IntentAction::InfoRequest
        );
    }

    #[test]
    fn unknown_fallback_has_half_confidence() {
        let c = RegexClassifier::new();
        let r = c.classify("palavras soltas sem verbo conhecido");
        assert_eq!(r.intent, Intent::Unknown);
        assert!((r.confidence - 0.5).abs() < f32::EPSILON);
    }
}
