// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The LLM planner contract.
//!
//! The planner never decides state transitions. It returns exactly one of
//! three actions — call a tool, respond with text, or explicitly do
//! nothing — as strict JSON. Anything else is replaced by a fixed apology;
//! raw model output (especially raw JSON) never reaches the end user.

use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use lembra_core::{ChatTurn, LembraError};
use lembra_intent::extract_json_block;
use lembra_tools::ToolName;

/// Validated planner output.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerAction {
    /// Execute a named tool with the given arguments.
    CallTool {
        name: ToolName,
        args: serde_json::Value,
    },
    /// Reply with natural-language text.
    Respond { text: String },
    /// Explicit no-op acknowledgment.
    Noop,
}

/// Strict wire DTO. Unknown fields reject the whole output; the tagged
/// union is validated by hand because the tag set is closed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlannerDto {
    action: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    args: Option<serde_json::Value>,
    #[serde(default)]
    text: Option<String>,
}

/// Parse raw model output into a [`PlannerAction`].
///
/// Strips reasoning wrappers and code fences first; rejects on any field
/// mismatch. Callers map errors to the fixed apology.
pub fn parse_planner_action(raw: &str) -> Result<PlannerAction, LembraError> {
    let json = extract_json_block(raw)
        .ok_or_else(|| LembraError::provider("planner output had no JSON object"))?;

    let dto: PlannerDto = serde_json::from_str(&json).map_err(|e| {
        debug!(error = %e, "planner JSON rejected");
        LembraError::provider(format!("planner JSON rejected: {e}"))
    })?;

    match dto.action.as_str() {
        "call_tool" => {
            let name_str = dto
                .name
                .ok_or_else(|| LembraError::provider("call_tool without a name"))?;
            let name = ToolName::from_str(&name_str)
                .map_err(|_| LembraError::provider(format!("unknown tool `{name_str}`")))?;
            Ok(PlannerAction::CallTool {
                name,
                args: dto.args.unwrap_or_else(|| serde_json::json!({})),
            })
        }
        "respond" => {
            let text = dto
                .text
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| LembraError::provider("respond without text"))?;
            Ok(PlannerAction::Respond { text })
        }
        "noop" => Ok(PlannerAction::Noop),
        other => Err(LembraError::provider(format!(
            "unknown planner action `{other}`"
        ))),
    }
}

/// Build the planner instruction prompt.
pub fn planner_prompt(assistant_name: &str, enabled_tools: &[ToolName], user_text: &str) -> String {
    let tool_list = enabled_tools
        .iter()
        .map(ToolName::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Você é {assistant_name}, um assistente de memória pessoal. Decida a \
         próxima ação e responda com UM único objeto JSON, sem texto extra, \
         em um destes formatos:\n\
         {{\"action\": \"call_tool\", \"name\": \"<ferramenta>\", \"args\": {{...}}}}\n\
         {{\"action\": \"respond\", \"text\": \"<resposta ao usuário>\"}}\n\
         {{\"action\": \"noop\"}}\n\
         Ferramentas disponíveis: {tool_list}.\n\
         Mensagem do usuário:\n{user_text}"
    )
}

/// Turn stored transcript rows into model history turns.
pub fn history_from_transcript(
    messages: &[lembra_core::MessageRecord],
) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| {
            if m.role == "assistant" {
                ChatTurn::assistant(m.content.clone())
            } else {
                ChatTurn::user(m.content.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tool_parses() {
        let action = parse_planner_action(
            r#"{"action": "call_tool", "name": "search_items", "args": {"query": "filmes"}}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            PlannerAction::CallTool {
                name: ToolName::SearchItems,
                args: serde_json::json!({"query": "filmes"}),
            }
        );
    }

    #[test]
    fn respond_parses() {
        let action =
            parse_planner_action(r#"{"action": "respond", "text": "claro!"}"#).unwrap();
        assert_eq!(
            action,
            PlannerAction::Respond {
                text: "claro!".to_string()
            }
        );
    }

    #[test]
    fn noop_parses() {
        assert_eq!(
            parse_planner_action(r#"{"action": "noop"}"#).unwrap(),
            PlannerAction::Noop
        );
    }

    #[test]
    fn wrapped_output_parses() {
        let raw = "<think>usuário quer listar</think>\n```json\n{\"action\": \"noop\"}\n```";
        assert_eq!(parse_planner_action(raw).unwrap(), PlannerAction::Noop);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(parse_planner_action(r#"{"action": "reboot"}"#).is_err());
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert!(
            parse_planner_action(r#"{"action": "call_tool", "name": "rm_rf"}"#).is_err()
        );
    }

    #[test]
    fn extra_fields_are_rejected() {
        assert!(parse_planner_action(
            r#"{"action": "noop", "sneaky": "field"}"#
        )
        .is_err());
    }

    #[test]
    fn respond_without_text_is_rejected() {
        assert!(parse_planner_action(r#"{"action": "respond"}"#).is_err());
        assert!(parse_planner_action(r#"{"action": "respond", "text": "  "}"#).is_err());
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(parse_planner_action("desculpa, não sei").is_err());
    }

    #[test]
    fn prompt_lists_enabled_tools() {
        let prompt = planner_prompt(
            "lembra",
            &[ToolName::SaveNote, ToolName::SearchItems],
            "oi",
        );
        assert!(prompt.contains("save_note, search_items"));
        assert!(prompt.contains("oi"));
    }
}
