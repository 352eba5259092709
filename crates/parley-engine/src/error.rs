use parley_core::ConversationId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("loop inbox closed for conversation {0}")]
    ChannelClosed(ConversationId),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidSettings(_) => "invalid_settings",
            Self::ChannelClosed(_) => "channel_closed",
            Self::Internal(_) => "internal",
        }
    }
}
