//! Process-local store backed by `DashMap`, used by `parley serve --ephemeral` and tests.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use parley_core::{ConversationId, ConversationMetadata, Settings, UserId};

use crate::error::StoreError;
use crate::traits::{ConversationStore, SettingsStore};

#[derive(Default)]
pub struct InMemoryStore {
    settings: DashMap<UserId, Settings>,
    conversations: DashMap<ConversationId, ConversationMetadata>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_settings(&self, user_id: UserId, settings: Settings) {
        let _ = self.settings.insert(user_id, settings);
    }

}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn load(&self, user_id: Option<&UserId>) -> Result<Option<Settings>, StoreError> {
        Ok(user_id.and_then(|id| self.settings.get(id).map(|s| s.value().clone())))
    }

    async fn save(&self, user_id: &UserId, settings: Settings) -> Result<(), StoreError> {
        self.put_settings(user_id.clone(), settings);
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn exists(&self, id: &ConversationId) -> Result<bool, StoreError> {
        Ok(self.conversations.contains_key(id))
    }

    async fn save_metadata(&self, metadata: ConversationMetadata) -> Result<(), StoreError> {
        match self.conversations.entry(metadata.conversation_id.clone()) {
            Entry::Occupied(entry) => Err(StoreError::Conflict(format!(
                "conversation {} already exists",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                debug!(conversation_id = %metadata.conversation_id, "metadata stored");
                let _ = entry.insert(metadata);
                Ok(())
            }
        }
    }

    async fn get_metadata(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError> {
        Ok(self.conversations.get(id).map(|m| m.value().clone()))
    }

    async fn list_metadata(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMetadata>, StoreError> {
        let mut owned: Vec<ConversationMetadata> = self
            .conversations
            .iter()
            .filter(|m| m.user_id.as_ref() == Some(user_id))
            .map(|m| m.value().clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit as usize);
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ApiKey, ConversationTrigger};

    fn metadata(id: &str, model: &str) -> ConversationMetadata {
        ConversationMetadata {
            conversation_id: ConversationId::from_raw(id),
            trigger: ConversationTrigger::Api,
            title: "Conversation x".into(),
            user_id: Some(UserId::from_raw("owner")),
            selected_repository: None,
            selected_branch: None,
            git_provider: None,
            llm_model: model.into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn settings_by_user() {
        let store = InMemoryStore::new();
        store.put_settings(
            UserId::from_raw("u1"),
            Settings {
                llm_api_key: Some(ApiKey::new("sk")),
                ..Settings::default()
            },
        );
        assert!(store.load(Some(&UserId::from_raw("u1"))).await.unwrap().is_some());
        assert!(store.load(Some(&UserId::from_raw("u2"))).await.unwrap().is_none());
        assert!(store.load(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_is_conditional_create() {
        let store = InMemoryStore::new();
        store.save_metadata(metadata("c1", "first")).await.unwrap();
        let second = store.save_metadata(metadata("c1", "second")).await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        assert_eq!(store.conversations.len(), 1);
        let kept = store
            .get_metadata(&ConversationId::from_raw("c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.llm_model, "first");
    }

    #[tokio::test]
    async fn exists_after_save() {
        let store = InMemoryStore::new();
        let id = ConversationId::from_raw("c2");
        assert!(!store.exists(&id).await.unwrap());
        store.save_metadata(metadata("c2", "m")).await.unwrap();
        assert!(store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let store = InMemoryStore::new();
        for (id, at) in [("a", "2026-01-01"), ("b", "2026-03-01"), ("c", "2026-02-01")] {
            let mut meta = metadata(id, "m");
            meta.created_at = at.into();
            store.save_metadata(meta).await.unwrap();
        }
        let listed = store.list_metadata(&UserId::from_raw("owner"), 2).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(store
            .list_metadata(&UserId::from_raw("stranger"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn saved_settings_load_back() {
        let store = InMemoryStore::new();
        let user = UserId::from_raw("u9");
        store.save(&user, Settings::default()).await.unwrap();
        assert!(store.load(Some(&user)).await.unwrap().is_some());
    }
}
