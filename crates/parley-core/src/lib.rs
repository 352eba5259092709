pub mod conversation;
pub mod ids;
pub mod loop_info;
pub mod messages;
pub mod security;
pub mod settings;

pub use conversation::{default_conversation_title, ConversationMetadata, ConversationTrigger};
pub use ids::{ConversationId, UserId};
pub use loop_info::{AgentLoopInfo, LoopStatus};
pub use messages::InitialMessage;
pub use security::{ApiKey, CustomSecret, CustomSecrets, GitProvider, ProviderToken, ProviderTokens, SecretsStore};
pub use settings::{EffectiveSettings, SessionOverrides, Settings};
