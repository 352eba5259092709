//! Conversation creation orchestration.
//!
//! Settings resolution, identity, variant assignment, metadata persistence and
//! launch run strictly in that order. Variant assignment and the metadata
//! write happen only for ids the conversation store has never seen.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use parley_core::{
    default_conversation_title, AgentLoopInfo, ConversationId, ConversationMetadata,
    ConversationTrigger, CustomSecrets, EffectiveSettings, GitProvider, InitialMessage,
    ProviderTokens, SessionOverrides, Settings, UserId,
};
use parley_engine::{ExecutionEngine, ExperimentAssigner};
use parley_store::{ConversationStore, SettingsStore, StoreError};

use crate::config::AnonymousDefaults;
use crate::error::ConversationError;
use crate::resolver::SettingsResolver;

/// Input to [`ConversationService::create_conversation`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateConversationRequest {
    pub user_id: Option<UserId>,
    pub git_provider_tokens: Option<ProviderTokens>,
    pub custom_secrets: Option<CustomSecrets>,
    pub selected_repository: Option<String>,
    pub selected_branch: Option<String>,
    pub initial_user_msg: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub replay_json: Option<String>,
    pub conversation_instructions: Option<String>,
    pub conversation_trigger: ConversationTrigger,
    /// Deprecated. Logged and otherwise ignored.
    pub attach_convo_id: bool,
    pub git_provider: Option<GitProvider>,
    pub conversation_id: Option<ConversationId>,
}

/// What is known about one conversation: its creation record and, when a
/// loop is running, the loop handle.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationStatus {
    pub conversation_id: ConversationId,
    pub metadata: Option<ConversationMetadata>,
    pub agent_loop: Option<AgentLoopInfo>,
}

pub struct ConversationService {
    resolver: SettingsResolver,
    settings: Arc<dyn SettingsStore>,
    conversations: Arc<dyn ConversationStore>,
    assigner: Arc<dyn ExperimentAssigner>,
    engine: Arc<dyn ExecutionEngine>,
}

impl ConversationService {
    pub fn new(
        settings_store: Arc<dyn SettingsStore>,
        conversation_store: Arc<dyn ConversationStore>,
        assigner: Arc<dyn ExperimentAssigner>,
        engine: Arc<dyn ExecutionEngine>,
        defaults: AnonymousDefaults,
    ) -> Self {
        Self {
            resolver: SettingsResolver::new(Arc::clone(&settings_store), defaults),
            settings: settings_store,
            conversations: conversation_store,
            assigner,
            engine,
        }
    }

    /// Create (or resume) a conversation and hand it to the execution engine.
    #[instrument(
        skip_all,
        fields(
            user_id = ?request.user_id.as_ref().map(UserId::as_str),
            trigger = %request.conversation_trigger,
            conversation_id = tracing::field::Empty,
        )
    )]
    pub async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> Result<AgentLoopInfo, ConversationError> {
        let CreateConversationRequest {
            user_id,
            git_provider_tokens,
            custom_secrets,
            selected_repository,
            selected_branch,
            initial_user_msg,
            image_urls,
            replay_json,
            conversation_instructions,
            conversation_trigger,
            attach_convo_id,
            git_provider,
            conversation_id,
        } = request;

        let overrides = SessionOverrides {
            git_provider_tokens,
            custom_secrets,
            selected_repository,
            selected_branch,
            git_provider,
            conversation_instructions,
        };
        let mut settings = self.resolver.resolve(user_id.as_ref(), overrides).await?;

        let conversation_id = conversation_id.unwrap_or_else(ConversationId::generate);
        let _ = tracing::Span::current().record("conversation_id", conversation_id.as_str());

        let exists = self
            .conversations
            .exists(&conversation_id)
            .await
            .map_err(ConversationError::Store)?;

        if exists {
            debug!("conversation already exists, skipping creation");
        } else {
            settings = self
                .assigner
                .assign(user_id.as_ref(), &conversation_id, settings)
                .await;
            self.persist_metadata(&conversation_id, user_id.as_ref(), conversation_trigger, &settings)
                .await?;
        }

        let initial_message = InitialMessage::from_parts(initial_user_msg, image_urls);

        if attach_convo_id {
            warn!("attach_convo_id is deprecated and has no effect");
        }

        let info = self
            .engine
            .start_or_resume(
                &conversation_id,
                settings,
                user_id.as_ref(),
                initial_message,
                replay_json,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, kind = e.error_kind(), "agent loop launch failed");
                ConversationError::Launch(e)
            })?;

        info!(resumed = info.resumed, "conversation ready");
        Ok(info)
    }

    /// Creation record and live loop state for one conversation. `None` when
    /// neither the store nor the engine knows the id.
    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    pub async fn conversation_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ConversationStatus>, ConversationError> {
        let metadata = self
            .conversations
            .get_metadata(conversation_id)
            .await
            .map_err(ConversationError::Store)?;
        let agent_loop = self.engine.status(conversation_id);
        if metadata.is_none() && agent_loop.is_none() {
            return Ok(None);
        }
        Ok(Some(ConversationStatus {
            conversation_id: conversation_id.clone(),
            metadata,
            agent_loop,
        }))
    }

    /// A user's conversations, newest first.
    pub async fn list_conversations(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ConversationMetadata>, ConversationError> {
        self.conversations
            .list_metadata(user_id, limit)
            .await
            .map_err(ConversationError::Store)
    }

    /// Store settings for a user; later creations for that user resolve from them.
    #[instrument(skip(self, settings), fields(user_id = %user_id))]
    pub async fn save_settings(
        &self,
        user_id: &UserId,
        settings: Settings,
    ) -> Result<(), ConversationError> {
        self.settings
            .save(user_id, settings)
            .await
            .map_err(ConversationError::Store)?;
        info!("user settings saved");
        Ok(())
    }

    async fn persist_metadata(
        &self,
        conversation_id: &ConversationId,
        user_id: Option<&UserId>,
        trigger: ConversationTrigger,
        settings: &EffectiveSettings,
    ) -> Result<(), ConversationError> {
        let metadata = ConversationMetadata {
            conversation_id: conversation_id.clone(),
            trigger,
            title: default_conversation_title(conversation_id),
            user_id: user_id.cloned(),
            selected_repository: settings.selected_repository.clone(),
            selected_branch: settings.selected_branch.clone(),
            git_provider: settings.git_provider,
            llm_model: settings.llm_model.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        match self.conversations.save_metadata(metadata).await {
            Ok(()) => {
                info!(llm_model = %settings.llm_model, "conversation metadata saved");
                Ok(())
            }
            Err(StoreError::Conflict(detail)) => {
                // Another request created this id between our existence check and write.
                warn!(detail = %detail, "conversation created concurrently, continuing to launch");
                Ok(())
            }
            Err(e) => Err(ConversationError::Store(e)),
        }
    }
}
