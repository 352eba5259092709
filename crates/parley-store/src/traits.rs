//! Store interfaces consumed by the conversation service.

use async_trait::async_trait;

use parley_core::{ConversationId, ConversationMetadata, Settings, UserId};

use crate::error::StoreError;

/// Per-user settings lookup.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load stored settings. `Ok(None)` means the user has none (or is
    /// anonymous); `Err` means the store itself could not be read.
    async fn load(&self, user_id: Option<&UserId>) -> Result<Option<Settings>, StoreError>;

    /// Insert or replace a user's settings.
    async fn save(&self, user_id: &UserId, settings: Settings) -> Result<(), StoreError>;
}

/// Conversation metadata persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn exists(&self, id: &ConversationId) -> Result<bool, StoreError>;

    /// Create the metadata record. Implementations must reject a second
    /// record for the same id with [`StoreError::Conflict`].
    async fn save_metadata(&self, metadata: ConversationMetadata) -> Result<(), StoreError>;

    async fn get_metadata(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError>;

    /// A user's conversations, newest first.
    async fn list_metadata(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMetadata>, StoreError>;
}
