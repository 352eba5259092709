pub mod conversations;
pub mod database;
pub mod error;
pub mod memory;
pub mod row_helpers;
pub mod schema;
pub mod settings;
pub mod traits;

pub use conversations::ConversationRepo;
pub use database::Database;
pub use error::StoreError;
pub use memory::InMemoryStore;
pub use settings::SettingsRepo;
pub use traits::{ConversationStore, SettingsStore};
