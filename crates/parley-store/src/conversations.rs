use async_trait::async_trait;
use tracing::instrument;

use parley_core::{ConversationId, ConversationMetadata, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::traits::ConversationStore;

const SELECT_COLUMNS: &str = "SELECT id, user_id, trigger, title, selected_repository, selected_branch,
        git_provider, llm_model, created_at
 FROM conversations";

/// SQLite-backed conversation metadata.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Database,
}

impl ConversationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn contains(&self, id: &ConversationId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
                [id.as_str()],
                |row| row.get(0),
            )?;
            Ok(found != 0)
        })
    }

    /// Insert a metadata record. The primary key makes this a conditional
    /// create: an existing id yields [`StoreError::Conflict`].
    #[instrument(skip(self, metadata), fields(conversation_id = %metadata.conversation_id))]
    pub fn insert(&self, metadata: &ConversationMetadata) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO conversations (id, user_id, trigger, title, selected_repository,
                    selected_branch, git_provider, llm_model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    metadata.conversation_id.as_str(),
                    metadata.user_id.as_ref().map(UserId::as_str),
                    metadata.trigger.to_string(),
                    metadata.title,
                    metadata.selected_repository,
                    metadata.selected_branch,
                    metadata.git_provider.map(|p| p.to_string()),
                    metadata.llm_model,
                    metadata.created_at,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) if row_helpers::is_unique_violation(&e) => Err(StoreError::Conflict(
                    format!("conversation {} already exists", metadata.conversation_id),
                )),
                Err(e) => Err(e.into()),
            }
        })
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn get(&self, id: &ConversationId) -> Result<Option<ConversationMetadata>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            rows.next()?.map(row_to_metadata).transpose()
        })
    }

    /// List a user's conversations, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMetadata>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            let mut rows = stmt.query(rusqlite::params![user_id.as_str(), limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_metadata(row)?);
            }
            Ok(results)
        })
    }
}

#[async_trait]
impl ConversationStore for ConversationRepo {
    async fn exists(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let repo = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || repo.contains(&id)).await?
    }

    async fn save_metadata(&self, metadata: ConversationMetadata) -> Result<(), StoreError> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || repo.insert(&metadata)).await?
    }

    async fn get_metadata(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationMetadata>, StoreError> {
        let repo = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || repo.get(&id)).await?
    }

    async fn list_metadata(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMetadata>, StoreError> {
        let repo = self.clone();
        let user_id = user_id.clone();
        tokio::task::spawn_blocking(move || repo.list_for_user(&user_id, limit)).await?
    }
}

fn row_to_metadata(row: &rusqlite::Row<'_>) -> Result<ConversationMetadata, StoreError> {
    let trigger: String = row_helpers::get(row, 2, "conversations", "trigger")?;
    let git_provider: Option<String> = row_helpers::get_opt(row, 6, "conversations", "git_provider")?;

    Ok(ConversationMetadata {
        conversation_id: ConversationId::from_raw(row_helpers::get::<String>(row, 0, "conversations", "id")?),
        user_id: row_helpers::get_opt::<String>(row, 1, "conversations", "user_id")?
            .map(UserId::from_raw),
        trigger: row_helpers::parse_enum(&trigger, "conversations", "trigger")?,
        title: row_helpers::get(row, 3, "conversations", "title")?,
        selected_repository: row_helpers::get_opt(row, 4, "conversations", "selected_repository")?,
        selected_branch: row_helpers::get_opt(row, 5, "conversations", "selected_branch")?,
        git_provider: git_provider
            .map(|p| row_helpers::parse_enum(&p, "conversations", "git_provider"))
            .transpose()?,
        llm_model: row_helpers::get(row, 7, "conversations", "llm_model")?,
        created_at: row_helpers::get(row, 8, "conversations", "created_at")?,
    })
}
