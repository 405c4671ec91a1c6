// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool executor: argument validation, enablement checks, and dispatch.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{debug, warn};

use lembra_core::types::ItemType;
use lembra_core::{EnrichmentProvider, LembraError, MemoryItemRecord, StorageAdapter};

use crate::{ToolContext, ToolName, ToolOutcome};

/// Display order of save tools in clarification menus.
const SAVE_TOOL_ORDER: &[ToolName] = &[
    ToolName::SaveNote,
    ToolName::SaveMovie,
    ToolName::SaveTvShow,
    ToolName::SaveVideo,
    ToolName::SaveLink,
];

#[derive(Debug, Deserialize)]
struct SaveArgs {
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    /// Enrichment metadata blob (year, overview, genres, poster).
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EnrichArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    item_id: String,
}

#[derive(Debug, Deserialize)]
struct SettingsArgs {
    assistant_name: String,
}

/// Executes tools against storage and enrichment backends.
pub struct ToolExecutor {
    storage: Arc<dyn StorageAdapter>,
    enrichment: Arc<dyn EnrichmentProvider>,
    disabled: RwLock<HashSet<ToolName>>,
    default_assistant_name: String,
}

impl ToolExecutor {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        enrichment: Arc<dyn EnrichmentProvider>,
        disabled_names: &[String],
        default_assistant_name: String,
    ) -> Self {
        let mut disabled = HashSet::new();
        for name in disabled_names {
            match ToolName::from_str(name) {
                Ok(tool) if tool.is_user_tool() => {
                    disabled.insert(tool);
                }
                Ok(tool) => {
                    warn!(tool = %tool, "system tools cannot be disabled, ignoring");
                }
                Err(_) => {
                    warn!(name = %name, "unknown tool in disabled list, ignoring");
                }
            }
        }
        Self {
            storage,
            enrichment,
            disabled: RwLock::new(disabled),
            default_assistant_name,
        }
    }

    /// Whether a tool is currently enabled. System tools always are.
    pub fn is_enabled(&self, tool: ToolName) -> bool {
        if !tool.is_user_tool() {
            return true;
        }
        !self
            .disabled
            .read()
            .expect("disabled set lock poisoned")
            .contains(&tool)
    }

    /// Toggle a user tool at runtime. Rejects system tools.
    pub fn set_enabled(&self, tool: ToolName, enabled: bool) -> Result<(), LembraError> {
        if !tool.is_user_tool() {
            return Err(LembraError::Tool {
                name: tool.to_string(),
                message: "system tools cannot be toggled".to_string(),
            });
        }
        let mut disabled = self.disabled.write().expect("disabled set lock poisoned");
        if enabled {
            disabled.remove(&tool);
        } else {
            disabled.insert(tool);
        }
        Ok(())
    }

    /// The currently-enabled save tools, in menu order. Clarification menus
    /// derive from this list.
    pub fn enabled_save_tools(&self) -> Vec<ToolName> {
        SAVE_TOOL_ORDER
            .iter()
            .copied()
            .filter(|t| self.is_enabled(*t))
            .collect()
    }

    /// Execute a tool. Business failures come back inside the outcome;
    /// infrastructure failures (storage down) propagate as errors.
    pub async fn execute(
        &self,
        tool: ToolName,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        if !self.is_enabled(tool) {
            return Ok(ToolOutcome::business_error(format!(
                "tool `{tool}` is disabled"
            )));
        }

        debug!(tool = %tool, user_id = %ctx.user_id, "executing tool");

        match tool {
            ToolName::SaveNote
            | ToolName::SaveMovie
            | ToolName::SaveTvShow
            | ToolName::SaveVideo
            | ToolName::SaveLink => {
                let item_type = tool.save_item_type().expect("save tool has an item type");
                self.save_item(ctx, item_type, args).await
            }
            ToolName::SearchItems | ToolName::MemorySearch => self.search_items(ctx, args).await,
            ToolName::MemoryGet => self.memory_get(ctx, args).await,
            ToolName::EnrichMovie => self.enrich(ItemType::Movie, args).await,
            ToolName::EnrichTvShow => self.enrich(ItemType::TvShow, args).await,
            ToolName::EnrichVideo => self.enrich(ItemType::Video, args).await,
            ToolName::DeleteMemory => self.delete_memory(ctx, args).await,
            ToolName::DeleteAllMemories => self.delete_all(ctx).await,
            ToolName::GetAssistantName => self.get_assistant_name(ctx).await,
            ToolName::UpdateUserSettings => self.update_settings(ctx, args).await,
            // Integration tools are part of the wire contract but only do
            // anything when the deployment wires the integration in.
            tool if tool.is_integration() => Ok(ToolOutcome::business_error(format!(
                "a integração `{tool}` não está configurada"
            ))),
            other => Ok(ToolOutcome::business_error(format!(
                "tool `{other}` has no executor"
            ))),
        }
    }

    async fn save_item(
        &self,
        ctx: &ToolContext,
        item_type: ItemType,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        let args: SaveArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::business_error(format!("invalid arguments: {e}"))),
        };
        if args.title.trim().is_empty() {
            return Ok(ToolOutcome::business_error("title must not be empty"));
        }

        // Duplicate saves are recoverable, not errors.
        if let Some(existing) = self
            .storage
            .find_memory_by_title(&ctx.user_id, item_type, args.title.trim())
            .await?
        {
            return Ok(ToolOutcome::ok_with_data(
                format!("\"{}\" já estava salvo por aqui!", existing.title),
                serde_json::json!({ "duplicate": true, "item_id": existing.id }),
            ));
        }

        let item = MemoryItemRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: ctx.user_id.clone(),
            item_type,
            title: args.title.trim().to_string(),
            content: args.content,
            url: args.url,
            metadata: args.metadata.map(|m| m.to_string()),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.storage.insert_memory_item(&item).await?;

        Ok(ToolOutcome::ok_with_data(
            format!("Salvei \"{}\" pra você!", item.title),
            serde_json::json!({ "item_id": item.id }),
        ))
    }

    async fn search_items(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        let args: SearchArgs = serde_json::from_value(args).unwrap_or(SearchArgs {
            query: None,
            limit: None,
        });
        let limit = args.limit.unwrap_or(10).min(50);

        let items = match args.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                self.storage.search_memory(&ctx.user_id, query, limit).await?
            }
            _ => self.storage.list_memory(&ctx.user_id, limit).await?,
        };

        let message = if items.is_empty() {
            "Não achei nada salvo com isso.".to_string()
        } else {
            let listing = items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {} ({})", i + 1, item.title, item.item_type))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Encontrei isso aqui:\n{listing}")
        };

        let data = serde_json::to_value(&items).map_err(|e| LembraError::Internal(e.to_string()))?;
        Ok(ToolOutcome::ok_with_data(message, data))
    }

    async fn memory_get(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        let args: GetArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::business_error(format!("invalid arguments: {e}"))),
        };
        // Owner scoping happens in the query: a foreign id is just "not found".
        let items = self.storage.list_memory(&ctx.user_id, 200).await?;
        match items.into_iter().find(|i| i.id == args.item_id) {
            Some(item) => {
                let data =
                    serde_json::to_value(&item).map_err(|e| LembraError::Internal(e.to_string()))?;
                Ok(ToolOutcome::ok_with_data(item.title.clone(), data))
            }
            None => Ok(ToolOutcome::business_error("item not found")),
        }
    }

    async fn enrich(
        &self,
        item_type: ItemType,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        let args: EnrichArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::business_error(format!("invalid arguments: {e}"))),
        };
        let candidates = self.enrichment.search(item_type, &args.query).await?;
        let data = serde_json::to_value(&candidates)
            .map_err(|e| LembraError::Internal(e.to_string()))?;
        Ok(ToolOutcome::ok_with_data(
            format!("{} resultado(s)", candidates.len()),
            data,
        ))
    }

    async fn delete_memory(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        let args: DeleteArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::business_error(format!("invalid arguments: {e}"))),
        };

        if let Some(item_id) = args.item_id {
            return if self.storage.delete_memory(&ctx.user_id, &item_id).await? {
                Ok(ToolOutcome::ok_with_message("Apagado!"))
            } else {
                Ok(ToolOutcome::business_error("item not found"))
            };
        }

        if let Some(query) = args.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let count = self.storage.delete_memory_by_query(&ctx.user_id, query).await?;
            return if count > 0 {
                Ok(ToolOutcome::ok_with_message(format!(
                    "Apaguei {count} item(ns)."
                )))
            } else {
                Ok(ToolOutcome::business_error("nothing matched"))
            };
        }

        Ok(ToolOutcome::business_error(
            "either item_id or query is required",
        ))
    }

    async fn delete_all(&self, ctx: &ToolContext) -> Result<ToolOutcome, LembraError> {
        let count = self.storage.delete_all_memory(&ctx.user_id).await?;
        Ok(ToolOutcome::ok_with_message(format!(
            "Pronto, apaguei tudo ({count} item(ns))."
        )))
    }

    async fn get_assistant_name(&self, ctx: &ToolContext) -> Result<ToolOutcome, LembraError> {
        let user = self.storage.user(&ctx.user_id).await?;
        let name = user
            .assistant_name
            .unwrap_or_else(|| self.default_assistant_name.clone());
        Ok(ToolOutcome::ok_with_data(
            format!("Pode me chamar de {name}!"),
            serde_json::json!({ "assistant_name": name }),
        ))
    }

    async fn update_settings(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, LembraError> {
        let args: SettingsArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::business_error(format!("invalid arguments: {e}"))),
        };
        let name = args.assistant_name.trim();
        if name.is_empty() || name.chars().count() > 40 {
            return Ok(ToolOutcome::business_error(
                "assistant name must be 1-40 characters",
            ));
        }
        self.storage.set_assistant_name(&ctx.user_id, name).await?;
        Ok(ToolOutcome::ok_with_message(format!(
            "Combinado, agora me chamo {name}!"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lembra_core::types::{Candidate, Provider};
    use lembra_storage::SqliteStorage;
    use tempfile::tempdir;

    struct NoEnrichment;

    #[async_trait]
    impl EnrichmentProvider for NoEnrichment {
        fn name(&self) -> &str {
            "none"
        }

        async fn search(
            &self,
            _item_type: ItemType,
            _query: &str,
        ) -> Result<Vec<Candidate>, LembraError> {
            Ok(Vec::new())
        }
    }

    async fn setup() -> (ToolExecutor, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let storage = Arc::new(SqliteStorage::open_path(path.to_str().unwrap()).await.unwrap());
        let executor = ToolExecutor::new(
            storage,
            Arc::new(NoEnrichment),
            &[],
            "lembra".to_string(),
        );
        (executor, dir)
    }

    fn ctx() -> ToolContext {
        ToolContext {
            user_id: "u1".to_string(),
            conversation_id: "c1".to_string(),
            provider: Provider::Telegram,
            external_id: "12345".to_string(),
        }
    }

    #[tokio::test]
    async fn save_then_search_finds_item() {
        let (executor, _dir) = setup().await;
        let outcome = executor
            .execute(
                ToolName::SaveMovie,
                &ctx(),
                serde_json::json!({"title": "Interestelar"}),
            )
            .await
            .unwrap();
        assert!(outcome.success);

        let outcome = executor
            .execute(
                ToolName::SearchItems,
                &ctx(),
                serde_json::json!({"query": "interestelar"}),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.message.unwrap().contains("Interestelar"));
    }

    #[tokio::test]
    async fn duplicate_save_is_recoverable() {
        let (executor, _dir) = setup().await;
        let args = serde_json::json!({"title": "Interestelar"});
        executor
            .execute(ToolName::SaveMovie, &ctx(), args.clone())
            .await
            .unwrap();
        let outcome = executor
            .execute(ToolName::SaveMovie, &ctx(), args)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["duplicate"], true);
    }

    #[tokio::test]
    async fn disabled_save_tool_refuses() {
        let (executor, _dir) = setup().await;
        executor.set_enabled(ToolName::SaveVideo, false).unwrap();
        let outcome = executor
            .execute(
                ToolName::SaveVideo,
                &ctx(),
                serde_json::json!({"title": "x"}),
            )
            .await
            .unwrap();
        assert!(!outcome.success);

        let enabled = executor.enabled_save_tools();
        assert!(!enabled.contains(&ToolName::SaveVideo));
        assert!(enabled.contains(&ToolName::SaveNote));
    }

    #[tokio::test]
    async fn system_tools_cannot_be_toggled() {
        let (executor, _dir) = setup().await;
        assert!(executor.set_enabled(ToolName::SearchItems, false).is_err());
        assert!(executor.is_enabled(ToolName::SearchItems));
    }

    #[tokio::test]
    async fn delete_all_reports_count() {
        let (executor, _dir) = setup().await;
        for title in ["a", "b"] {
            executor
                .execute(ToolName::SaveNote, &ctx(), serde_json::json!({"title": title}))
                .await
                .unwrap();
        }
        let outcome = executor
            .execute(ToolName::DeleteAllMemories, &ctx(), serde_json::json!({}))
            .await
            .unwrap();
        assert!(outcome.message.unwrap().contains('2'));
    }

    #[tokio::test]
    async fn assistant_name_defaults_then_updates() {
        let (executor, _dir) = setup().await;
        let outcome = executor
            .execute(ToolName::GetAssistantName, &ctx(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.data.unwrap()["assistant_name"], "lembra");

        executor
            .execute(
                ToolName::UpdateUserSettings,
                &ctx(),
                serde_json::json!({"assistant_name": "Jarvis"}),
            )
            .await
            .unwrap();
        let outcome = executor
            .execute(ToolName::GetAssistantName, &ctx(), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.data.unwrap()["assistant_name"], "Jarvis");
    }

    #[tokio::test]
    async fn invalid_args_are_business_errors() {
        let (executor, _dir) = setup().await;
        let outcome = executor
            .execute(ToolName::SaveNote, &ctx(), serde_json::json!({"nope": 1}))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn integration_tools_report_not_configured() {
        let (executor, _dir) = setup().await;
        for tool in [
            ToolName::DailyLogSearch,
            ToolName::CalendarEvents,
            ToolName::TodoTasks,
            ToolName::Reminders,
        ] {
            let outcome = executor
                .execute(tool, &ctx(), serde_json::json!({}))
                .await
                .unwrap();
            assert!(!outcome.success);
            assert!(outcome.error.unwrap().contains("não está configurada"));
        }
    }

    #[tokio::test]
    async fn config_disabled_list_is_honored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let storage = Arc::new(SqliteStorage::open_path(path.to_str().unwrap()).await.unwrap());
        let executor = ToolExecutor::new(
            storage,
            Arc::new(NoEnrichment),
            &["save_video".to_string(), "search_items".to_string(), "bogus".to_string()],
            "lembra".to_string(),
        );
        // save_video honored; search_items is a system tool, ignored; bogus ignored.
        assert!(!executor.is_enabled(ToolName::SaveVideo));
        assert!(executor.is_enabled(ToolName::SearchItems));
    }
}
