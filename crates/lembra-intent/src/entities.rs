// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic entity extraction.
//!
//! These rules are shared by every classifier tier so that selections,
//! item types, and URLs come out identical no matter which tier produced
//! the intent: numeric/ordinal selections collapse duplicates and sort
//! ascending, item-type words map to the closed [`ItemType`] enum, URLs
//! are matched with a standard pattern.

use std::sync::LazyLock;

use regex::Regex;

use lembra_core::types::{Entities, ItemType};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\b").expect("static regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>\)]+").expect("static regex"));

/// Ordinal and cardinal words mapped to 1-based selections.
const NUMBER_WORDS: &[(&str, usize)] = &[
    ("primeiro", 1),
    ("primeira", 1),
    ("segundo", 2),
    ("segunda", 2),
    ("terceiro", 3),
    ("terceira", 3),
    ("quarto", 4),
    ("quarta", 4),
    ("quinto", 5),
    ("quinta", 5),
    ("sexto", 6),
    ("sexta", 6),
    ("sétimo", 7),
    ("setimo", 7),
    ("sétima", 7),
    ("setima", 7),
];

/// Item-type words (Portuguese) mapped to the closed enum.
const ITEM_TYPE_WORDS: &[(&str, ItemType)] = &[
    ("nota", ItemType::Note),
    ("notas", ItemType::Note),
    ("anotação", ItemType::Note),
    ("anotacao", ItemType::Note),
    ("lembrete", ItemType::Note),
    ("filme", ItemType::Movie),
    ("filmes", ItemType::Movie),
    ("série", ItemType::TvShow),
    ("serie", ItemType::TvShow),
    ("séries", ItemType::TvShow),
    ("series", ItemType::TvShow),
    ("vídeo", ItemType::Video),
    ("video", ItemType::Video),
    ("vídeos", ItemType::Video),
    ("videos", ItemType::Video),
    ("link", ItemType::Link),
    ("links", ItemType::Link),
];

/// Back-reference phrases meaning "save the previous thing".
const SAVE_PREVIOUS_PHRASES: &[&str] = &[
    "salva isso",
    "salvar isso",
    "salva aí",
    "salva ai",
    "guarda aí",
    "guarda ai",
    "guarda isso",
    "guardar isso",
    "pode salvar",
    "pode salvar?",
    "pode guardar",
    "pode guardar?",
];

/// Extract 1-based selections from numbers and ordinal words.
///
/// Duplicates collapse and the result is sorted ascending, so
/// "o 3, o primeiro e o 3" yields `[1, 3]`.
pub fn extract_selections(text: &str) -> Vec<usize> {
    let lower = text.to_lowercase();
    let mut selections: Vec<usize> = NUMBER_RE
        .captures_iter(&lower)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .collect();

    for (word, value) in NUMBER_WORDS {
        if lower.split_whitespace().any(|w| w == *word) {
            selections.push(*value);
        }
    }

    selections.sort_unstable();
    selections.dedup();
    selections
}

/// Map an item-type word in the text to the closed enum, first match wins
/// in enum-priority order (note > movie > tv > video > link is not imposed;
/// textual order is).
pub fn extract_item_type(text: &str) -> Option<ItemType> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, ItemType)> = None;
    for (word, item_type) in ITEM_TYPE_WORDS {
        if let Some(pos) = find_word(&lower, word) {
            if best.map(|(p, _)| pos < p).unwrap_or(true) {
                best = Some((pos, *item_type));
            }
        }
    }
    best.map(|(_, t)| t)
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(word) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric);
        let after = abs + word.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..].chars().next().is_some_and(char::is_alphanumeric);
        if before_ok && after_ok {
            return Some(abs);
        }
        start = abs + word.len();
        if start >= haystack.len() {
            break;
        }
    }
    None
}

/// Extract the first URL in the text, if any.
pub fn extract_url(text: &str) -> Option<String> {
    URL_RE.find(text).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', ';', '!', '?'])
            .to_string()
    })
}

/// True when the text is one of the fixed "save the previous thing"
/// back-reference phrases.
pub fn is_save_previous_reference(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    let normalized = normalized.trim_end_matches('!').trim();
    SAVE_PREVIOUS_PHRASES
        .iter()
        .any(|p| normalized == *p || normalized == p.trim_end_matches('?'))
}

/// Fill entity fields the deterministic rules can produce, preserving
/// whatever the producing tier already extracted.
pub fn augment(text: &str, entities: &mut Entities) {
    if entities.selections.is_empty() {
        entities.selections = extract_selections(text);
    }
    if entities.item_type.is_none() {
        entities.item_type = extract_item_type(text);
    }
    if entities.url.is_none() {
        entities.url = extract_url(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selections_dedupe_and_sort() {
        assert_eq!(extract_selections("o 3, o primeiro e o 3"), vec![1, 3]);
        assert_eq!(extract_selections("2 e 1"), vec![1, 2]);
        assert_eq!(extract_selections("nenhum número"), Vec::<usize>::new());
    }

    #[test]
    fn selections_ignore_zero() {
        assert_eq!(extract_selections("0"), Vec::<usize>::new());
    }

    #[test]
    fn ordinals_map_to_positions() {
        assert_eq!(extract_selections("o segundo"), vec![2]);
        assert_eq!(extract_selections("a quinta opção"), vec![5]);
    }

    #[test]
    fn item_type_words_map_to_enum() {
        assert_eq!(extract_item_type("salva esse filme"), Some(ItemType::Movie));
        assert_eq!(extract_item_type("uma nota rápida"), Some(ItemType::Note));
        assert_eq!(extract_item_type("aquela série"), Some(ItemType::TvShow));
        assert_eq!(extract_item_type("um vídeo legal"), Some(ItemType::Video));
        assert_eq!(extract_item_type("guarda o link"), Some(ItemType::Link));
        assert_eq!(extract_item_type("sem tipo aqui"), None);
    }

    #[test]
    fn item_type_does_not_match_inside_words() {
        // "notável" must not match "nota"
        assert_eq!(extract_item_type("que notável"), None);
    }

    #[test]
    fn first_item_type_in_text_wins() {
        assert_eq!(
            extract_item_type("é um filme ou uma série?"),
            Some(ItemType::Movie)
        );
    }

    #[test]
    fn urls_are_extracted_and_trimmed() {
        assert_eq!(
            extract_url("olha isso https://example.com/a?b=1, demais"),
            Some("https://example.com/a?b=1".to_string())
        );
        assert_eq!(extract_url("sem link"), None);
    }

    #[test]
    fn save_previous_phrases_match() {
        assert!(is_save_previous_reference("salva isso"));
        assert!(is_save_previous_reference("Guarda aí"));
        assert!(is_save_previous_reference("pode salvar?"));
        assert!(is_save_previous_reference("pode salvar"));
        assert!(!is_save_previous_reference("salva o filme interestelar"));
    }

    #[test]
    fn augment_preserves_existing_fields() {
        let mut entities = Entities {
            selections: vec![9],
            ..Default::default()
        };
        augment("escolho o 2", &mut entities);
        assert_eq!(entities.selections, vec![9]);
    }

    #[test]
    fn augment_fills_missing_fields() {
        let mut entities = Entities::default();
        augment("salva o filme https://t.co/x", &mut entities);
        assert_eq!(entities.item_type, Some(ItemType::Movie));
        assert_eq!(entities.url.as_deref(), Some("https://t.co/x"));
    }
}
