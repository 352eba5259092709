use serde::{Deserialize, Serialize};

use parley_core::{ConversationId, UserId};

/// Lifecycle events broadcast by the in-process engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoopEvent {
    #[serde(rename = "loop_started")]
    LoopStarted {
        conversation_id: ConversationId,
        user_id: Option<UserId>,
        llm_model: String,
    },

    #[serde(rename = "loop_resumed")]
    LoopResumed { conversation_id: ConversationId },

    #[serde(rename = "message_received")]
    MessageReceived {
        conversation_id: ConversationId,
        content: String,
        image_count: usize,
    },

    #[serde(rename = "replay_received")]
    ReplayReceived {
        conversation_id: ConversationId,
        bytes: usize,
    },

    #[serde(rename = "loop_stopped")]
    LoopStopped { conversation_id: ConversationId },
}

impl LoopEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LoopStarted { .. } => "loop_started",
            Self::LoopResumed { .. } => "loop_resumed",
            Self::MessageReceived { .. } => "message_received",
            Self::ReplayReceived { .. } => "replay_received",
            Self::LoopStopped { .. } => "loop_stopped",
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::LoopStarted { conversation_id, .. }
            | Self::LoopResumed { conversation_id }
            | Self::MessageReceived { conversation_id, .. }
            | Self::ReplayReceived { conversation_id, .. }
            | Self::LoopStopped { conversation_id } => conversation_id,
        }
    }
}
