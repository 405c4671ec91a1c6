// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted LLM provider for deterministic testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use lembra_core::{ChatTurn, LembraError, LlmProvider};

/// Returns scripted responses in order, then repeats the last one.
/// With no script it always errors, which exercises the fallback paths.
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// An LLM that always fails, for degradation tests.
    pub fn unavailable() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Prompts received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock-llm"
    }

    async fn complete(&self, prompt: &str, _history: &[ChatTurn]) -> Result<String, LembraError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(prompt.to_string());

        let next = self.responses.lock().expect("responses lock").pop_front();
        match next {
            Some(response) => {
                *self.last.lock().expect("last lock") = Some(response.clone());
                Ok(response)
            }
            None => match self.last.lock().expect("last lock").clone() {
                Some(response) => Ok(response),
                None => Err(LembraError::provider("mock llm has no scripted response")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_in_order_then_repeat() {
        let llm = MockLlm::new(["um", "dois"]);
        assert_eq!(llm.complete("a", &[]).await.unwrap(), "um");
        assert_eq!(llm.complete("b", &[]).await.unwrap(), "dois");
        assert_eq!(llm.complete("c", &[]).await.unwrap(), "dois");
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn unavailable_always_errors() {
        let llm = MockLlm::unavailable();
        assert!(llm.complete("a", &[]).await.is_err());
    }
}
