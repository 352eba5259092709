//! Per-user settings and the effective configuration a conversation runs with.
//!
//! [`Settings`] is what the settings store persists for a user (or what the
//! anonymous fallback synthesizes). [`EffectiveSettings`] is built fresh for
//! every creation request by [`EffectiveSettings::resolve`], which layers the
//! per-call [`SessionOverrides`] on top with a fixed, field-by-field
//! precedence: a supplied override always wins.

use serde::{Deserialize, Serialize};

use crate::security::{ApiKey, CustomSecrets, GitProvider, ProviderTokens, SecretsStore};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_AGENT: &str = "CodeActAgent";
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_LLM_MODEL: &str = "anthropic/claude-3-haiku-20240307";
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Stored per-user configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub language: String,
    pub agent: String,
    pub max_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_analyzer: Option<String>,
    pub confirmation_mode: bool,
    pub llm_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<ApiKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,
    pub enable_default_condenser: bool,
    pub enable_sound_notifications: bool,
    pub enable_proactive_conversation_starters: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget_per_task: Option<f64>,
    pub secrets_store: SecretsStore,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.into(),
            agent: DEFAULT_AGENT.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            security_analyzer: None,
            confirmation_mode: false,
            llm_model: DEFAULT_LLM_MODEL.into(),
            llm_api_key: None,
            llm_base_url: Some(DEFAULT_LLM_BASE_URL.into()),
            enable_default_condenser: true,
            enable_sound_notifications: false,
            enable_proactive_conversation_starters: true,
            max_budget_per_task: None,
            secrets_store: SecretsStore::default(),
        }
    }
}

impl Settings {
    /// True when an LLM key is present and not blank.
    pub fn has_usable_api_key(&self) -> bool {
        self.llm_api_key.as_ref().is_some_and(|k| !k.is_blank())
    }
}

/// Values supplied with a single creation request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOverrides {
    pub git_provider_tokens: Option<ProviderTokens>,
    pub custom_secrets: Option<CustomSecrets>,
    pub selected_repository: Option<String>,
    pub selected_branch: Option<String>,
    pub git_provider: Option<GitProvider>,
    pub conversation_instructions: Option<String>,
}

/// Fully resolved configuration handed to the execution engine.
#[derive(Clone, Debug)]
pub struct EffectiveSettings {
    pub language: String,
    pub agent: String,
    pub max_iterations: u32,
    pub security_analyzer: Option<String>,
    pub confirmation_mode: bool,
    pub llm_model: String,
    pub llm_api_key: Option<ApiKey>,
    pub llm_base_url: Option<String>,
    pub enable_default_condenser: bool,
    pub enable_sound_notifications: bool,
    pub enable_proactive_conversation_starters: bool,
    pub max_budget_per_task: Option<f64>,
    pub git_provider_tokens: ProviderTokens,
    pub custom_secrets: CustomSecrets,
    pub selected_repository: Option<String>,
    pub selected_branch: Option<String>,
    pub git_provider: Option<GitProvider>,
    pub conversation_instructions: Option<String>,
}

impl EffectiveSettings {
    /// Layer per-call overrides over base settings.
    ///
    /// Every base field is carried over. Repository, branch, provider and
    /// instructions come only from the call. Provider tokens and custom
    /// secrets come from the call when supplied, otherwise from the base
    /// settings' secrets store.
    pub fn resolve(base: Settings, overrides: SessionOverrides) -> Self {
        let SecretsStore {
            provider_tokens: stored_tokens,
            custom_secrets: stored_secrets,
        } = base.secrets_store;

        Self {
            language: base.language,
            agent: base.agent,
            max_iterations: base.max_iterations,
            security_analyzer: base.security_analyzer,
            confirmation_mode: base.confirmation_mode,
            llm_model: base.llm_model,
            llm_api_key: base.llm_api_key,
            llm_base_url: base.llm_base_url,
            enable_default_condenser: base.enable_default_condenser,
            enable_sound_notifications: base.enable_sound_notifications,
            enable_proactive_conversation_starters: base.enable_proactive_conversation_starters,
            max_budget_per_task: base.max_budget_per_task,
            git_provider_tokens: overrides.git_provider_tokens.unwrap_or(stored_tokens),
            custom_secrets: overrides.custom_secrets.unwrap_or(stored_secrets),
            selected_repository: overrides.selected_repository,
            selected_branch: overrides.selected_branch,
            git_provider: overrides.git_provider,
            conversation_instructions: overrides.conversation_instructions,
        }
    }

    pub fn has_usable_api_key(&self) -> bool {
        self.llm_api_key.as_ref().is_some_and(|k| !k.is_blank())
    }
}
