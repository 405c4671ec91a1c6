// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned user-facing messages.
//!
//! Every user-visible failure is a friendly, on-brand message in the
//! user's language; internal error detail never leaves the logs.

use rand::seq::SliceRandom;

/// Fixed apology when the planner/LLM output is unusable.
pub const APOLOGY: &str =
    "Opa, me perdi aqui! Pode repetir de outro jeito, por favor?";

/// Reply when a deny/cancel resolves a pending flow.
pub const CANCELLED: &str = "Tranquilo, cancelei por aqui!";

/// Reply when "save the previous thing" finds nothing to save.
pub const NOTHING_TO_SAVE: &str =
    "Hmm, não achei nada recente pra salvar. Me manda de novo o que você quer guardar?";

/// Friendly deflections used while a conversation sits in off-topic chat.
const DEFLECTIONS: &[&str] = &[
    "Acho que a gente se enrolou! Sou melhor guardando filmes, séries, vídeos, links e notas. Quer salvar alguma coisa?",
    "Vou confessar: não entendi. Mas se quiser salvar ou buscar algo que você guardou, é só pedir!",
    "Essa conversa fugiu do meu alcance! Me pede pra salvar ou procurar alguma coisa que eu brilho.",
];

/// Casual small-talk replies.
const CASUAL: &[&str] = &[
    "Oi! Tudo certo por aqui. Quer salvar ou buscar alguma coisa?",
    "Olá! Tô pronto pra guardar seus filmes, notas e links.",
    "E aí! Me conta o que você quer salvar hoje?",
];

/// A randomized friendly deflection.
pub fn deflection() -> &'static str {
    DEFLECTIONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEFLECTIONS[0])
}

/// A randomized casual reply.
pub fn casual() -> &'static str {
    CASUAL
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(CASUAL[0])
}

/// Message sent when enrichment found nothing and the item saved bare.
pub fn saved_without_enrichment(title: &str) -> String {
    format!(
        "Não achei detalhes sobre \"{title}\", mas salvei mesmo assim só com o título!"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflection_comes_from_the_fixed_set() {
        for _ in 0..20 {
            assert!(DEFLECTIONS.contains(&deflection()));
        }
    }

    #[test]
    fn casual_comes_from_the_fixed_set() {
        for _ in 0..20 {
            assert!(CASUAL.contains(&casual()));
        }
    }

    #[test]
    fn saved_without_enrichment_names_the_title() {
        assert!(saved_without_enrichment("Akira").contains("Akira"));
    }
}
