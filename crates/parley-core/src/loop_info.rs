use serde::{Deserialize, Serialize};

use crate::ids::ConversationId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Starting,
    Running,
}

/// Handle describing a started or resumed agent loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoopInfo {
    pub conversation_id: ConversationId,
    pub status: LoopStatus,
    /// True when the call attached to a loop that was already running.
    pub resumed: bool,
    pub started_at: String,
}
