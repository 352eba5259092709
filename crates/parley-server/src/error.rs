use parley_engine::EngineError;
use parley_store::StoreError;

/// Failures of the conversation creation flow.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// No usable LLM API key after settings resolution.
    #[error("authentication failed: LLM API key is missing or blank")]
    Authentication,

    /// The settings store could not be read. An absent record is not an error.
    #[error("settings lookup failed: {0}")]
    MissingConfiguration(#[source] StoreError),

    #[error("conversation store error: {0}")]
    Store(#[source] StoreError),

    #[error("agent loop launch failed: {0}")]
    Launch(#[source] EngineError),
}

impl ConversationError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::MissingConfiguration(_) => "missing_configuration",
            Self::Store(_) => "store",
            Self::Launch(_) => "launch",
        }
    }

    /// Wire error code for RPC responses.
    pub fn rpc_code(&self) -> &'static str {
        match self {
            Self::Authentication => crate::rpc::AUTHENTICATION_ERROR,
            Self::MissingConfiguration(_) => crate::rpc::MISSING_SETTINGS,
            Self::Store(_) => crate::rpc::STORE_ERROR,
            Self::Launch(_) => crate::rpc::LAUNCH_ERROR,
        }
    }
}

/// Errors loading the service configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
