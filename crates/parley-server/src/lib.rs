pub mod config;
pub mod error;
pub mod event_bridge;
pub mod handlers;
pub mod resolver;
pub mod rpc;
pub mod server;
pub mod service;

pub use config::{load_config, AnonymousDefaults, ServiceConfig};
pub use error::{ConfigError, ConversationError};
pub use event_bridge::spawn_event_log;
pub use handlers::HandlerState;
pub use resolver::SettingsResolver;
pub use server::{start, ServerConfig, ServerHandle};
pub use service::{ConversationService, ConversationStatus, CreateConversationRequest};
