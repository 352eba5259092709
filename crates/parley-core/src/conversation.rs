use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, UserId};
use crate::security::GitProvider;

/// What initiated a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationTrigger {
    #[default]
    Gui,
    Api,
    SuggestedTask,
    Slack,
    Resumed,
}

impl std::fmt::Display for ConversationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gui => write!(f, "gui"),
            Self::Api => write!(f, "api"),
            Self::SuggestedTask => write!(f, "suggested_task"),
            Self::Slack => write!(f, "slack"),
            Self::Resumed => write!(f, "resumed"),
        }
    }
}

impl std::str::FromStr for ConversationTrigger {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gui" => Ok(Self::Gui),
            "api" => Ok(Self::Api),
            "suggested_task" => Ok(Self::SuggestedTask),
            "slack" => Ok(Self::Slack),
            "resumed" => Ok(Self::Resumed),
            other => Err(format!("unknown conversation trigger: {other}")),
        }
    }
}

/// Creation record, written once per conversation and never updated here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub conversation_id: ConversationId,
    pub trigger: ConversationTrigger,
    pub title: String,
    pub user_id: Option<UserId>,
    pub selected_repository: Option<String>,
    pub selected_branch: Option<String>,
    pub git_provider: Option<GitProvider>,
    pub llm_model: String,
    pub created_at: String,
}

const TITLE_ID_CHARS: usize = 5;

/// Title given to a conversation before anything better is known.
pub fn default_conversation_title(id: &ConversationId) -> String {
    let prefix: String = id.as_str().chars().take(TITLE_ID_CHARS).collect();
    format!("Conversation {prefix}")
}
