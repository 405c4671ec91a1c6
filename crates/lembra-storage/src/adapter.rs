// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `StorageAdapter` implementation over SQLite.

use async_trait::async_trait;

use lembra_config::model::StorageConfig;
use lembra_core::types::ItemType;
use lembra_core::{
    ConversationRecord, LembraError, MemoryItemRecord, MessageRecord, QueueEntry, StorageAdapter,
    UserRecord,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage for the Lembra assistant.
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Open the database configured in `config` and run migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, LembraError> {
        let db = Database::open(&config.database_path).await?;
        Ok(Self { db })
    }

    /// Open a database at an explicit path (tests).
    pub async fn open_path(path: &str) -> Result<Self, LembraError> {
        Ok(Self {
            db: Database::open(path).await?,
        })
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn active_conversation(
        &self,
        user_id: &str,
    ) -> Result<Option<ConversationRecord>, LembraError> {
        queries::conversations::active_for_user(&self.db, user_id).await
    }

    async fn conversation(&self, id: &str) -> Result<Option<ConversationRecord>, LembraError> {
        queries::conversations::get(&self.db, id).await
    }

    async fn create_conversation(
        &self,
        user_id: &str,
    ) -> Result<ConversationRecord, LembraError> {
        let now = chrono::Utc::now().to_rfc3339();
        let record = ConversationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            state: "idle".to_string(),
            context: "{}".to_string(),
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        queries::conversations::create_active(&self.db, &record).await?;
        Ok(record)
    }

    async fn update_conversation(
        &self,
        id: &str,
        state: &str,
        context: &str,
    ) -> Result<(), LembraError> {
        queries::conversations::update(&self.db, id, state, context).await
    }

    async fn close_conversation(&self, id: &str) -> Result<(), LembraError> {
        queries::conversations::close(&self.db, id).await
    }

    async fn append_message(&self, record: &MessageRecord) -> Result<bool, LembraError> {
        queries::messages::append(&self.db, record).await
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, LembraError> {
        queries::messages::recent(&self.db, conversation_id, limit).await
    }

    async fn insert_memory_item(&self, item: &MemoryItemRecord) -> Result<(), LembraError> {
        queries::memory::insert(&self.db, item).await
    }

    async fn find_memory_by_title(
        &self,
        user_id: &str,
        item_type: ItemType,
        title: &str,
    ) -> Result<Option<MemoryItemRecord>, LembraError> {
        queries::memory::find_by_title(&self.db, user_id, item_type, title).await
    }

    async fn search_memory(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItemRecord>, LembraError> {
        queries::memory::search(&self.db, user_id, query, limit).await
    }

    async fn list_memory(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItemRecord>, LembraError> {
        queries::memory::list(&self.db, user_id, limit).await
    }

    async fn delete_memory(&self, user_id: &str, item_id: &str) -> Result<bool, LembraError> {
        queries::memory::delete(&self.db, user_id, item_id).await
    }

    async fn delete_all_memory(&self, user_id: &str) -> Result<u64, LembraError> {
        queries::memory::delete_all(&self.db, user_id).await
    }

    async fn delete_memory_by_query(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<u64, LembraError> {
        queries::memory::delete_by_query(&self.db, user_id, query).await
    }

    async fn user(&self, user_id: &str) -> Result<UserRecord, LembraError> {
        queries::users::get_or_create(&self.db, user_id).await
    }

    async fn set_assistant_name(&self, user_id: &str, name: &str) -> Result<(), LembraError> {
        queries::users::set_assistant_name(&self.db, user_id, name).await
    }

    async fn record_offense(
        &self,
        user_id: &str,
        timeout_until: &str,
    ) -> Result<i64, LembraError> {
        queries::users::record_offense(&self.db, user_id, timeout_until).await
    }

    async fn enqueue(&self, partition: &str, payload: &str) -> Result<i64, LembraError> {
        queries::queue::enqueue(&self.db, partition, payload).await
    }

    async fn dequeue(&self, partition: &str) -> Result<Option<QueueEntry>, LembraError> {
        queries::queue::dequeue(&self.db, partition).await
    }

    async fn ack(&self, entry_id: i64) -> Result<(), LembraError> {
        queries::queue::ack(&self.db, entry_id).await
    }

    async fn fail(&self, entry_id: i64) -> Result<(), LembraError> {
        queries::queue::fail(&self.db, entry_id).await
    }

    async fn pending_partitions(&self) -> Result<Vec<String>, LembraError> {
        queries::queue::pending_partitions(&self.db).await
    }

    async fn close(&self) -> Result<(), LembraError> {
        self.db.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn adapter_round_trips_a_conversation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let storage = SqliteStorage::open_path(path.to_str().unwrap()).await.unwrap();

        let conversation = storage.create_conversation("u1").await.unwrap();
        assert!(conversation.is_active);
        assert_eq!(conversation.state, "idle");

        let active = storage.active_conversation("u1").await.unwrap().unwrap();
        assert_eq!(active.id, conversation.id);

        storage
            .update_conversation(&conversation.id, "processing", r#"{"x":1}"#)
            .await
            .unwrap();
        let updated = storage.conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(updated.state, "processing");

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn adapter_user_and_memory_flow() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let storage = SqliteStorage::open_path(path.to_str().unwrap()).await.unwrap();

        let user = storage.user("u1").await.unwrap();
        assert_eq!(user.offense_count, 0);

        let item = MemoryItemRecord {
            id: "i1".to_string(),
            user_id: "u1".to_string(),
            item_type: ItemType::Movie,
            title: "Interestelar".to_string(),
            content: None,
            url: None,
            metadata: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        storage.insert_memory_item(&item).await.unwrap();
        assert!(storage
            .find_memory_by_title("u1", ItemType::Movie, "INTERESTELAR")
            .await
            .unwrap()
            .is_some());

        storage.close().await.unwrap();
    }
}
