use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wraps an API key with secrecy protection (zeroized on drop, redacted in Debug).
///
/// Serializes to the plain value so it can round-trip through the settings
/// store; never log a serialized form.
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// True when the key is empty or made only of whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

/// Git hosting providers a conversation can be bound to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GitProvider {
    Github,
    Gitlab,
    Bitbucket,
    EnterpriseSso,
}

impl std::fmt::Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Github => f.write_str("github"),
            Self::Gitlab => f.write_str("gitlab"),
            Self::Bitbucket => f.write_str("bitbucket"),
            Self::EnterpriseSso => f.write_str("enterprise_sso"),
        }
    }
}

impl std::str::FromStr for GitProvider {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            "bitbucket" => Ok(Self::Bitbucket),
            "enterprise_sso" => Ok(Self::EnterpriseSso),
            other => Err(format!("unknown git provider: {other}")),
        }
    }
}

/// Access token for one git provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderToken {
    pub token: ApiKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl std::fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderToken")
            .field("user_id", &self.user_id)
            .field("host", &self.host)
            .finish()
    }
}

/// User-defined secret exposed to the agent by name.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustomSecret {
    pub secret: ApiKey,
    #[serde(default)]
    pub description: String,
}

impl std::fmt::Debug for CustomSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomSecret")
            .field("description", &self.description)
            .finish()
    }
}

pub type ProviderTokens = BTreeMap<GitProvider, ProviderToken>;
pub type CustomSecrets = BTreeMap<String, CustomSecret>;

/// Secrets a user keeps alongside their settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecretsStore {
    #[serde(default)]
    pub provider_tokens: ProviderTokens,
    #[serde(default)]
    pub custom_secrets: CustomSecrets,
}

/// Environment variable names consulted for anonymous defaults.
pub mod env_vars {
    pub const LLM_API_KEY: &str = "LLM_API_KEY";
    pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
    pub const LLM_MODEL: &str = "LLM_MODEL";
    pub const LLM_BASE_URL: &str = "LLM_BASE_URL";
    pub const DEFAULT_AGENT: &str = "DEFAULT_AGENT";
    pub const MAX_ITERATIONS: &str = "MAX_ITERATIONS";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_debug_redacted() {
        let key = ApiKey::new("sk-or-12345");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("sk-or"), "key leaked in debug: {debug}");
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn api_key_blank_detection() {
        assert!(ApiKey::new("").is_blank());
        assert!(ApiKey::new("   \t\n").is_blank());
        assert!(!ApiKey::new(" sk ").is_blank());
    }

    #[test]
    fn api_key_serde_roundtrip() {
        let key = ApiKey::new("sk-1");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#""sk-1""#);
        let parsed: ApiKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.expose(), "sk-1");
    }

    #[test]
    fn provider_token_debug_hides_token() {
        let token = ProviderToken {
            token: ApiKey::new("ghp_secret"),
            user_id: Some("octo".into()),
            host: None,
        };
        let debug = format!("{:?}", token);
        assert!(!debug.contains("ghp_secret"), "token leaked: {debug}");
        assert!(debug.contains("octo"));
    }

    #[test]
    fn custom_secret_debug_hides_value() {
        let secret = CustomSecret {
            secret: ApiKey::new("hunter2"),
            description: "db password".into(),
        };
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("hunter2"), "secret leaked: {debug}");
    }

    #[test]
    fn git_provider_wire_names() {
        assert_eq!(serde_json::to_string(&GitProvider::EnterpriseSso).unwrap(), r#""enterprise_sso""#);
        assert_eq!("gitlab".parse::<GitProvider>().unwrap(), GitProvider::Gitlab);
        assert_eq!(GitProvider::Github.to_string(), "github");
        assert!("svn".parse::<GitProvider>().is_err());
    }

    #[test]
    fn provider_tokens_keyed_by_wire_name() {
        let mut tokens = ProviderTokens::new();
        tokens.insert(
            GitProvider::Github,
            ProviderToken { token: ApiKey::new("t"), user_id: None, host: None },
        );
        let json = serde_json::to_value(&tokens).unwrap();
        assert_eq!(json["github"]["token"], "t");
    }
}
