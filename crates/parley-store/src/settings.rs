use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

use parley_core::{Settings, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::traits::SettingsStore;

/// SQLite-backed per-user settings.
#[derive(Clone)]
pub struct SettingsRepo {
    db: Database,
}

impl SettingsRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the stored settings for a user, if any.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn get(&self, user_id: &UserId) -> Result<Option<Settings>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT payload FROM user_settings WHERE user_id = ?1")?;
            let mut rows = stmt.query([user_id.as_str()])?;
            match rows.next()? {
                Some(row) => {
                    let raw: String = row_helpers::get(row, 0, "user_settings", "payload")?;
                    let settings = row_helpers::parse_json(&raw, "user_settings", "payload")?;
                    Ok(Some(settings))
                }
                None => Ok(None),
            }
        })
    }

    /// Insert or replace a user's settings.
    #[instrument(skip(self, settings), fields(user_id = %user_id))]
    pub fn upsert(&self, user_id: &UserId, settings: &Settings) -> Result<(), StoreError> {
        let payload = serde_json::to_string(settings)?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_settings (user_id, payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                rusqlite::params![user_id.as_str(), payload, now],
            )?;
            Ok(())
        })
    }
}

#[async_trait]
impl SettingsStore for SettingsRepo {
    async fn load(&self, user_id: Option<&UserId>) -> Result<Option<Settings>, StoreError> {
        let Some(user_id) = user_id.cloned() else {
            return Ok(None);
        };
        let repo = self.clone();
        tokio::task::spawn_blocking(move || repo.get(&user_id)).await?
    }

    async fn save(&self, user_id: &UserId, settings: Settings) -> Result<(), StoreError> {
        let repo = self.clone();
        let user_id = user_id.clone();
        tokio::task::spawn_blocking(move || repo.upsert(&user_id, &settings)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ApiKey, GitProvider, ProviderToken};

    fn repo() -> SettingsRepo {
        SettingsRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn missing_user_returns_none() {
        let repo = repo();
        assert!(repo.get(&UserId::from_raw("nobody")).unwrap().is_none());
    }

    #[test]
    fn upsert_then_get_keeps_secrets() {
        let repo = repo();
        let user = UserId::from_raw("u1");
        let mut settings = Settings {
            llm_model: "openai/gpt-4o".into(),
            llm_api_key: Some(ApiKey::new("sk-stored")),
            ..Settings::default()
        };
        settings.secrets_store.provider_tokens.insert(
            GitProvider::Github,
            ProviderToken {
                token: ApiKey::new("ghp_1"),
                user_id: None,
                host: Some("github.com".into()),
            },
        );
        repo.upsert(&user, &settings).unwrap();

        let fetched = repo.get(&user).unwrap().unwrap();
        assert_eq!(fetched.llm_model, "openai/gpt-4o");
        assert_eq!(fetched.llm_api_key.unwrap().expose(), "sk-stored");
        let token = &fetched.secrets_store.provider_tokens[&GitProvider::Github];
        assert_eq!(token.token.expose(), "ghp_1");
        assert_eq!(token.host.as_deref(), Some("github.com"));
    }

    #[test]
    fn upsert_replaces_previous_payload() {
        let repo = repo();
        let user = UserId::from_raw("u1");
        repo.upsert(&user, &Settings { max_iterations: 5, ..Settings::default() }).unwrap();
        repo.upsert(&user, &Settings { max_iterations: 9, ..Settings::default() }).unwrap();
        assert_eq!(repo.get(&user).unwrap().unwrap().max_iterations, 9);
    }

    #[test]
    fn corrupt_payload_is_reported() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_settings (user_id, payload, updated_at) VALUES ('u1', '{oops', 'now')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        let repo = SettingsRepo::new(db);
        let result = repo.get(&UserId::from_raw("u1"));
        assert!(matches!(result, Err(StoreError::CorruptRow { column: "payload", .. })));
    }

    #[tokio::test]
    async fn anonymous_load_is_none() {
        let repo = repo();
        assert!(repo.load(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_reads_through_blocking_pool() {
        let repo = repo();
        let user = UserId::from_raw("u2");
        repo.upsert(&user, &Settings { language: "de".into(), ..Settings::default() })
            .unwrap();
        let loaded = repo.load(Some(&user)).await.unwrap().unwrap();
        assert_eq!(loaded.language, "de");
    }

    #[tokio::test]
    async fn save_then_load() {
        let repo = repo();
        let user = UserId::from_raw("u3");
        let settings = Settings {
            llm_api_key: Some(ApiKey::new("sk-saved")),
            ..Settings::default()
        };
        repo.save(&user, settings).await.unwrap();
        let loaded = repo.load(Some(&user)).await.unwrap().unwrap();
        assert_eq!(loaded.llm_api_key.unwrap().expose(), "sk-saved");
    }
}
