//! Service configuration loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ServiceConfig::default()`]
//! 2. If a config file is given and exists, deep-merge its values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides (highest priority)
//!
//! Values that fail validation are replaced by defaults and described in
//! [`ServiceConfig::warnings`], which the caller logs once telemetry is up.
//!
//! Anonymous LLM defaults are read separately into [`AnonymousDefaults`] so the
//! request path never touches the process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn, Level};

use parley_core::security::env_vars;
use parley_core::settings::{DEFAULT_AGENT, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DEFAULT_MAX_ITERATIONS};
use parley_core::{ApiKey, Settings};
use parley_engine::{ExperimentAssigner, ModelVariantAssigner, NoopAssigner};
use parley_telemetry::TelemetryConfig;

use crate::error::ConfigError;

/// API key used when neither `LLM_API_KEY` nor `OPENROUTER_API_KEY` is set.
pub const FALLBACK_API_KEY: &str = "mock-api-key-for-testing";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    pub experiments: ExperimentSettings,
    /// Problems found while loading.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: parley_dir().join("parley.db"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module level overrides, e.g. `{"parley_store": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
            modules: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    pub variant_model: Option<String>,
    /// Share of new conversations routed to `variant_model`, 0..=100.
    pub variant_percent: u8,
}

impl ServiceConfig {
    /// Telemetry settings; unparseable levels fall back to INFO and are
    /// reported by [`Self::warnings`].
    pub fn telemetry(&self) -> TelemetryConfig {
        let log_level = self.logging.level.parse::<Level>().unwrap_or(Level::INFO);
        let module_levels = self
            .logging
            .modules
            .iter()
            .filter_map(|(module, level)| Some((module.clone(), level.parse::<Level>().ok()?)))
            .collect();
        TelemetryConfig {
            log_level,
            module_levels,
            json: self.logging.json,
            to_stderr: false,
        }
    }

    /// Everything found wrong with this config, including log levels that
    /// [`Self::telemetry`] had to drop.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = self.warnings.clone();
        if self.logging.level.parse::<Level>().is_err() {
            warnings.push(format!(
                "logging.level {:?} is not a valid level, using info",
                self.logging.level
            ));
        }
        for (module, level) in &self.logging.modules {
            if level.parse::<Level>().is_err() {
                warnings.push(format!(
                    "logging.modules.{module} {level:?} is not a valid level, ignoring"
                ));
            }
        }
        warnings
    }

    /// Log every config problem. Call after telemetry is installed.
    pub fn log_warnings(&self) {
        for problem in self.warnings() {
            warn!(problem = %problem, "config value ignored");
        }
    }

    /// Reset out-of-range file values to their defaults.
    fn validate(&mut self) {
        if self.experiments.variant_percent > 100 {
            self.warnings.push(format!(
                "experiments.variant_percent {} is outside 0..=100, using default",
                self.experiments.variant_percent
            ));
            self.experiments.variant_percent = ExperimentSettings::default().variant_percent;
        }
    }

    /// The experiment assigner described by this config.
    pub fn assigner(&self) -> Arc<dyn ExperimentAssigner> {
        match &self.experiments.variant_model {
            Some(model) if self.experiments.variant_percent > 0 => Arc::new(
                ModelVariantAssigner::new(model.clone(), self.experiments.variant_percent),
            ),
            _ => Arc::new(NoopAssigner),
        }
    }
}

/// Directory for default data paths (`$HOME/.parley`).
pub fn parley_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".parley")
}

/// Load config from an optional file, then apply env overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let defaults = serde_json::to_value(ServiceConfig::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "config file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut config: ServiceConfig = serde_json::from_value(merged)?;
    config.validate();
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut ServiceConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup. Invalid values are ignored and
/// recorded in `config.warnings`.
pub fn apply_overrides_from(config: &mut ServiceConfig, lookup: impl Fn(&str) -> Option<String>) {
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let invalid = |key: &str, value: &str, kind: &str| format!("{key}={value:?} is not a valid {kind}, ignoring");

    if let Some(v) = read_string("PARLEY_HOST") {
        config.server.host = v;
    }
    if let Some(v) = read_string("PARLEY_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => config.server.port = port,
            None => config.warnings.push(invalid("PARLEY_PORT", &v, "port")),
        }
    }
    if let Some(v) = read_string("PARLEY_DB_PATH") {
        config.storage.db_path = PathBuf::from(v);
    }
    if let Some(v) = read_string("PARLEY_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = read_string("PARLEY_LOG_JSON") {
        match parse_bool(&v) {
            Some(json) => config.logging.json = json,
            None => config.warnings.push(invalid("PARLEY_LOG_JSON", &v, "boolean")),
        }
    }
    if let Some(v) = read_string("PARLEY_VARIANT_MODEL") {
        config.experiments.variant_model = Some(v);
    }
    if let Some(v) = read_string("PARLEY_VARIANT_PERCENT") {
        match parse_u8_range(&v, 0, 100) {
            Some(percent) => config.experiments.variant_percent = percent,
            None => config
                .warnings
                .push(invalid("PARLEY_VARIANT_PERCENT", &v, "percentage")),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u8_range(val: &str, min: u8, max: u8) -> Option<u8> {
    let n: u8 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Anonymous defaults ──────────────────────────────────────────────────────

/// Settings synthesized for users without stored settings.
#[derive(Clone, Debug)]
pub struct AnonymousDefaults {
    pub agent: String,
    pub max_iterations: u32,
    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_api_key: ApiKey,
}

impl Default for AnonymousDefaults {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AnonymousDefaults {
    /// Read once from the process environment at startup.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_iterations = match read(env_vars::MAX_ITERATIONS) {
            Some(raw) => raw.trim().parse::<u32>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
                warn!(key = env_vars::MAX_ITERATIONS, value = %raw, "invalid iteration limit, using default");
                DEFAULT_MAX_ITERATIONS
            }),
            None => DEFAULT_MAX_ITERATIONS,
        };

        let api_key = read(env_vars::LLM_API_KEY)
            .or_else(|| read(env_vars::OPENROUTER_API_KEY))
            .unwrap_or_else(|| FALLBACK_API_KEY.to_string());

        Self {
            agent: read(env_vars::DEFAULT_AGENT).unwrap_or_else(|| DEFAULT_AGENT.to_string()),
            max_iterations,
            llm_model: read(env_vars::LLM_MODEL).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_base_url: read(env_vars::LLM_BASE_URL)
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_api_key: ApiKey::new(api_key),
        }
    }

    /// The stored-settings shape these defaults stand in for.
    pub fn to_settings(&self) -> Settings {
        Settings {
            agent: self.agent.clone(),
            max_iterations: self.max_iterations,
            llm_model: self.llm_model.clone(),
            llm_base_url: Some(self.llm_base_url.clone()),
            llm_api_key: Some(self.llm_api_key.clone()),
            ..Settings::default()
        }
    }
}
