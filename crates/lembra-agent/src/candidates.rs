// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The disambiguation/candidate sub-protocol.
//!
//! Candidate lists cap at seven entries, no pagination. Selection resolves
//! in a fixed order: `select_N` callback data, then numeric text against
//! the current list, then natural-language title matching. Free text that
//! is clearly a new request is never an error — it re-enters the normal
//! pipeline.

use lembra_core::types::{
    select_callback, Button, Candidate, IncomingMessage, PhotoCard, Reply,
    CALLBACK_CHOOSE_AGAIN, CALLBACK_CONFIRM_FINAL,
};
use lembra_intent::entities;

/// UX cap on how many candidates are ever shown.
pub const MAX_CANDIDATES: usize = 7;

/// Jaro-Winkler floor for a natural-language title match.
const TITLE_MATCH_THRESHOLD: f64 = 0.78;

/// How a reply during candidate confirmation resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// Exactly one candidate picked (index into the current list).
    Picked(usize),
    /// Several titles matched; show the narrowed list.
    Narrowed(Vec<usize>),
    /// The message is a new request; re-enter the idle pipeline.
    NewRequest,
}

/// Cap a candidate list for presentation and context storage.
pub fn cap_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// Render the numbered candidate list with one selection button each.
pub fn candidate_list_reply(query: &str, candidates: &[Candidate]) -> Reply {
    let mut lines = vec![format!("Achei isso pra \"{query}\". Qual deles é?")];
    for (i, candidate) in candidates.iter().enumerate() {
        let year = candidate
            .year
            .as_deref()
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        let overview = candidate
            .overview
            .as_deref()
            .map(|o| format!(" — {}", truncate(o, 80)))
            .unwrap_or_default();
        lines.push(format!("{}. {}{year}{overview}", i + 1, candidate.title));
    }
    lines.push("Responde com o número, ou \"cancela\" se não for nenhum.".to_string());

    let buttons: Vec<Vec<Button>> = candidates
        .chunks(4)
        .enumerate()
        .map(|(row, chunk)| {
            chunk
                .iter()
                .enumerate()
                .map(|(col, _)| {
                    let index = row * 4 + col;
                    Button::new((index + 1).to_string(), select_callback(index))
                })
                .collect()
        })
        .collect();

    Reply {
        text: lines.join("\n"),
        buttons,
        photo: None,
    }
}

/// Render the single-candidate detail view with yes/retry buttons.
pub fn final_confirmation_reply(candidate: &Candidate) -> Reply {
    let year = candidate
        .year
        .as_deref()
        .map(|y| format!(" ({y})"))
        .unwrap_or_default();
    let mut caption = format!("É esse aqui? {}{year}", candidate.title);
    if let Some(ref overview) = candidate.overview {
        caption.push_str(&format!("\n\n{}", truncate(overview, 280)));
    }

    let buttons = vec![vec![
        Button::new("✅ Confirmar", CALLBACK_CONFIRM_FINAL),
        Button::new("🔄 Escolher outro", CALLBACK_CHOOSE_AGAIN),
    ]];

    let photo = candidate.poster_url.as_ref().map(|url| PhotoCard {
        url: url.clone(),
        caption: caption.clone(),
    });

    Reply {
        text: caption,
        buttons,
        photo,
    }
}

/// Resolve a message against the current candidate list.
pub fn resolve_selection(msg: &IncomingMessage, candidates: &[Candidate]) -> SelectionOutcome {
    // 1. Callback data.
    if let Some(ref data) = msg.callback_data {
        if let Some(index) = lembra_core::types::parse_select_callback(data) {
            if index < candidates.len() {
                return SelectionOutcome::Picked(index);
            }
            // Out-of-range taps re-enter the pipeline, never error.
            return SelectionOutcome::NewRequest;
        }
    }

    // 2. Numeric text against the current list (1-based).
    let trimmed = msg.text.trim();
    if !trimmed.is_empty() {
        let selections = entities::extract_selections(trimmed);
        let word_count = trimmed.split_whitespace().count();
        if selections.len() == 1 && word_count <= 3 {
            let n = selections[0];
            if n >= 1 && n <= candidates.len() {
                return SelectionOutcome::Picked(n - 1);
            }
            return SelectionOutcome::NewRequest;
        }

        // 3. Natural-language title match.
        let lower = trimmed.to_lowercase();
        let mut scored: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, strsim::jaro_winkler(&lower, &c.title.to_lowercase())))
            .filter(|(_, score)| *score >= TITLE_MATCH_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        match scored.len() {
            0 => {}
            1 => return SelectionOutcome::Picked(scored[0].0),
            _ => {
                // A clear winner beats a narrowed list.
                if scored[0].1 - scored[1].1 > 0.1 {
                    return SelectionOutcome::Picked(scored[0].0);
                }
                return SelectionOutcome::Narrowed(
                    scored.into_iter().map(|(i, _)| i).collect(),
                );
            }
        }
    }

    SelectionOutcome::NewRequest
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
