use std::sync::Arc;

use tracing::{debug, warn};

use parley_core::{EffectiveSettings, SessionOverrides, UserId};
use parley_store::SettingsStore;

use crate::config::AnonymousDefaults;
use crate::error::ConversationError;

/// Produces the effective settings for one creation request.
pub struct SettingsResolver {
    store: Arc<dyn SettingsStore>,
    defaults: AnonymousDefaults,
}

impl SettingsResolver {
    pub fn new(store: Arc<dyn SettingsStore>, defaults: AnonymousDefaults) -> Self {
        Self { store, defaults }
    }

    /// Stored settings when the user has them, anonymous defaults otherwise,
    /// with the per-call overrides layered on top. Fails with
    /// [`ConversationError::Authentication`] when the result has no usable key.
    pub async fn resolve(
        &self,
        user_id: Option<&UserId>,
        overrides: SessionOverrides,
    ) -> Result<EffectiveSettings, ConversationError> {
        let stored = self
            .store
            .load(user_id)
            .await
            .map_err(ConversationError::MissingConfiguration)?;

        let base = match stored {
            Some(settings) => {
                debug!(user_id = ?user_id.map(UserId::as_str), "using stored settings");
                settings
            }
            None => {
                debug!(user_id = ?user_id.map(UserId::as_str), "no stored settings, using anonymous defaults");
                self.defaults.to_settings()
            }
        };

        let effective = EffectiveSettings::resolve(base, overrides);
        if !effective.has_usable_api_key() {
            warn!(user_id = ?user_id.map(UserId::as_str), "rejecting request without a usable LLM API key");
            return Err(ConversationError::Authentication);
        }
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{ApiKey, Settings};
    use parley_store::{InMemoryStore, StoreError};

    struct FailingSettings;

    #[async_trait]
    impl SettingsStore for FailingSettings {
        async fn load(&self, _user_id: Option<&UserId>) -> Result<Option<Settings>, StoreError> {
            Err(StoreError::Database("unavailable".into()))
        }

        async fn save(&self, _user_id: &UserId, _settings: Settings) -> Result<(), StoreError> {
            Err(StoreError::Database("unavailable".into()))
        }
    }

    fn resolver_with(store: InMemoryStore) -> SettingsResolver {
        SettingsResolver::new(Arc::new(store), AnonymousDefaults::default())
    }

    #[tokio::test]
    async fn stored_settings_are_used() {
        let store = InMemoryStore::new();
        store.put_settings(
            UserId::from_raw("u1"),
            Settings {
                llm_model: "openai/gpt-4o".into(),
                llm_api_key: Some(ApiKey::new("sk-user")),
                ..Settings::default()
            },
        );
        let resolved = resolver_with(store)
            .resolve(Some(&UserId::from_raw("u1")), SessionOverrides::default())
            .await
            .unwrap();
        assert_eq!(resolved.llm_model, "openai/gpt-4o");
        assert_eq!(resolved.llm_api_key.unwrap().expose(), "sk-user");
    }

    #[tokio::test]
    async fn stored_blank_key_is_rejected() {
        let store = InMemoryStore::new();
        store.put_settings(
            UserId::from_raw("u1"),
            Settings {
                llm_api_key: Some(ApiKey::new(" \t")),
                ..Settings::default()
            },
        );
        let result = resolver_with(store)
            .resolve(Some(&UserId::from_raw("u1")), SessionOverrides::default())
            .await;
        assert!(matches!(result, Err(ConversationError::Authentication)));
    }

    #[tokio::test]
    async fn stored_missing_key_is_rejected() {
        let store = InMemoryStore::new();
        store.put_settings(UserId::from_raw("u1"), Settings::default());
        let result = resolver_with(store)
            .resolve(Some(&UserId::from_raw("u1")), SessionOverrides::default())
            .await;
        assert!(matches!(result, Err(ConversationError::Authentication)));
    }

    #[tokio::test]
    async fn anonymous_user_gets_defaults_with_overrides() {
        let resolved = resolver_with(InMemoryStore::new())
            .resolve(
                None,
                SessionOverrides {
                    selected_repository: Some("org/repo".into()),
                    ..SessionOverrides::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(resolved.language, "en");
        assert_eq!(resolved.agent, "CodeActAgent");
        assert_eq!(resolved.selected_repository.as_deref(), Some("org/repo"));
        assert!(resolved.has_usable_api_key());
    }

    #[tokio::test]
    async fn blank_anonymous_key_is_rejected() {
        let mut defaults = AnonymousDefaults::default();
        defaults.llm_api_key = ApiKey::new("");
        let resolver = SettingsResolver::new(Arc::new(InMemoryStore::new()), defaults);
        let result = resolver.resolve(None, SessionOverrides::default()).await;
        assert!(matches!(result, Err(ConversationError::Authentication)));
    }

    #[tokio::test]
    async fn store_failure_is_missing_configuration() {
        let resolver = SettingsResolver::new(Arc::new(FailingSettings), AnonymousDefaults::default());
        let result = resolver
            .resolve(Some(&UserId::from_raw("u1")), SessionOverrides::default())
            .await;
        assert!(matches!(result, Err(ConversationError::MissingConfiguration(_))));
    }
}
