// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validated tool execution layer.
//!
//! Tools are the only way deterministic handlers and the LLM planner touch
//! user data. The tool set is a closed enum; a subset of always-on
//! "system" tools plus togglable `save_*` "user" tools. Clarification
//! menus are generated from the live enabled set, never hard-coded.

pub mod executor;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use lembra_core::types::{ItemType, Provider};

pub use executor::ToolExecutor;

/// The closed set of tool names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SaveNote,
    SaveMovie,
    SaveTvShow,
    SaveVideo,
    SaveLink,
    SearchItems,
    EnrichMovie,
    EnrichTvShow,
    EnrichVideo,
    DeleteMemory,
    DeleteAllMemories,
    GetAssistantName,
    UpdateUserSettings,
    MemorySearch,
    MemoryGet,
    DailyLogSearch,
    CalendarEvents,
    TodoTasks,
    Reminders,
}

impl ToolName {
    /// User tools can be toggled at runtime; system tools are always on.
    pub fn is_user_tool(self) -> bool {
        matches!(
            self,
            ToolName::SaveNote
                | ToolName::SaveMovie
                | ToolName::SaveTvShow
                | ToolName::SaveVideo
                | ToolName::SaveLink
        )
    }

    /// Tools that front an external integration and only work when that
    /// integration is wired up at deployment time.
    pub fn is_integration(self) -> bool {
        matches!(
            self,
            ToolName::DailyLogSearch
                | ToolName::CalendarEvents
                | ToolName::TodoTasks
                | ToolName::Reminders
        )
    }

    /// The item type a `save_*` tool persists, if it is one.
    pub fn save_item_type(self) -> Option<ItemType> {
        match self {
            ToolName::SaveNote => Some(ItemType::Note),
            ToolName::SaveMovie => Some(ItemType::Movie),
            ToolName::SaveTvShow => Some(ItemType::TvShow),
            ToolName::SaveVideo => Some(ItemType::Video),
            ToolName::SaveLink => Some(ItemType::Link),
            _ => None,
        }
    }

    /// The save tool for an item type.
    pub fn for_item_type(item_type: ItemType) -> ToolName {
        match item_type {
            ItemType::Note => ToolName::SaveNote,
            ItemType::Movie => ToolName::SaveMovie,
            ItemType::TvShow => ToolName::SaveTvShow,
            ItemType::Video => ToolName::SaveVideo,
            ItemType::Link => ToolName::SaveLink,
        }
    }

    /// Human label for clarification menus.
    pub fn menu_label(self) -> &'static str {
        match self {
            ToolName::SaveNote => "Nota",
            ToolName::SaveMovie => "Filme",
            ToolName::SaveTvShow => "Série",
            ToolName::SaveVideo => "Vídeo",
            ToolName::SaveLink => "Link",
            _ => "",
        }
    }
}

/// Execution context handed to every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub conversation_id: String,
    pub provider: Provider,
    pub external_id: String,
}

/// The uniform result of a tool call.
///
/// Business failures come back as `success = false` with `error` set;
/// recoverable situations (a duplicate save) stay `success = true` with a
/// specific friendly `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
            error: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }

    pub fn business_error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn tool_names_round_trip_their_wire_form() {
        for tool in ToolName::iter() {
            assert_eq!(ToolName::from_str(&tool.to_string()).unwrap(), tool);
        }
        assert_eq!(ToolName::SaveTvShow.to_string(), "save_tv_show");
        assert_eq!(ToolName::DeleteAllMemories.to_string(), "delete_all_memories");
    }

    #[test]
    fn exactly_the_save_tools_are_user_tools() {
        let user_tools: Vec<ToolName> =
            ToolName::iter().filter(|t| t.is_user_tool()).collect();
        assert_eq!(user_tools.len(), 5);
        assert!(user_tools.iter().all(|t| t.save_item_type().is_some()));
    }

    #[test]
    fn save_tool_item_type_round_trips() {
        for item_type in [
            ItemType::Note,
            ItemType::Movie,
            ItemType::TvShow,
            ItemType::Video,
            ItemType::Link,
        ] {
            assert_eq!(
                ToolName::for_item_type(item_type).save_item_type(),
                Some(item_type)
            );
        }
    }
}
