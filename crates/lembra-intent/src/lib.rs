// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Three-tier intent classification for the Lembra assistant.
//!
//! One cascade per inbound text message:
//!
//! 1. **Fast path** — zero-cost lexical scoring ([`fast::FastClassifier`]).
//! 2. **Confidence gate** — results at or above the threshold are accepted
//!    directly, skipping the LLM entirely.
//! 3. **LLM fallback** — a strict-JSON classifier call
//!    ([`llm::LlmIntentClassifier`]); transport or parse failures fall
//!    through silently.
//! 4. **Regex fallback** — a total deterministic matcher
//!    ([`patterns::RegexClassifier`]) that never fails.
//!
//! The cascade as a whole is infallible: `classify` always returns a usable
//! [`IntentResult`].

pub mod entities;
pub mod fast;
pub mod llm;
pub mod patterns;

use std::sync::Arc;

use tracing::debug;

use lembra_core::types::{Intent, IntentResult};
use lembra_core::LlmProvider;

pub use fast::FastClassifier;
pub use llm::{extract_json_block, LlmIntentClassifier};
pub use patterns::RegexClassifier;

/// Fast-path results at or above this confidence skip the LLM tier.
pub const CONFIDENCE_THRESHOLD: f32 = 0.85;

/// The full classification cascade.
pub struct IntentClassifier {
    fast: FastClassifier,
    llm: Option<LlmIntentClassifier>,
    regex: RegexClassifier,
    threshold: f32,
}

impl IntentClassifier {
    /// Build a cascade with an optional LLM tier.
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            fast: FastClassifier::new(),
            llm: llm.map(LlmIntentClassifier::new),
            regex: RegexClassifier::new(),
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    /// Build a cascade with a custom confidence gate (tests).
    pub fn with_threshold(llm: Option<Arc<dyn LlmProvider>>, threshold: f32) -> Self {
        let mut c = Self::new(llm);
        c.threshold = threshold;
        c
    }

    /// Classify one inbound text. Never fails.
    pub async fn classify(&self, text: &str) -> IntentResult {
        let fast = self.fast.classify(text);
        if fast.confidence >= self.threshold && fast.intent != Intent::Unknown {
            debug!(
                intent = %fast.intent,
                action = %fast.action,
                confidence = fast.confidence,
                "fast tier accepted"
            );
            return fast;
        }

        if let Some(ref llm) = self.llm {
            match llm.classify(text).await {
                Ok(result) => {
                    debug!(
                        intent = %result.intent,
                        action = %result.action,
                        confidence = result.confidence,
                        "llm tier accepted"
                    );
                    return result;
                }
                Err(e) => {
                    debug!(error = %e, "llm tier failed, falling back to regex");
                }
            }
        }

        let result = self.regex.classify(text);
        debug!(
            intent = %result.intent,
            action = %result.action,
            confidence = result.confidence,
            "regex tier result"
        );
        result
    }
}
