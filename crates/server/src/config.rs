//! # Application Configuration
//!
//! This module defines the configuration structure for the `docrag-server` and
//! provides the logic for loading it from a `config.yml` file and environment
//! variables.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use docrag::{
    types::{EmbeddingConfig, ProviderConfig},
    CacheConfig, ChatConfig, RetryPolicy,
};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use tracing::info;

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// The path to the SQLite database file. Loaded from `DB_URL` env var.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Configuration for the text embedding model.
    pub embedding: EmbeddingConfig,
    /// A map of named, reusable generation provider configurations.
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Which providers answer questions, plus the orchestrator knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct ChatSettings {
    /// The key of the provider, from `providers`, that streams answers.
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    /// The provider for follow-up questions. Defaults to `provider`.
    #[serde(default)]
    pub follow_up_provider: Option<String>,
    #[serde(flatten)]
    pub options: ChatConfig,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            follow_up_provider: None,
            options: ChatConfig::default(),
        }
    }
}

/// Provides a default value for the `port` field if not set in the environment.
fn default_port() -> u16 {
    9090
}

/// Provides a default value for the `db_url` field if not set in the environment.
fn default_db_url() -> String {
    "db/docrag.db".to_string()
}

fn default_chat_provider() -> String {
    "default".to_string()
}

// Reads a file and substitutes `${VAR}` references from the environment.
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(e.to_string()))?;
    let expanded_content = re.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the application configuration from a file and environment variables.
///
/// - Without an override, `config.yml` next to this crate is used, falling back to
///   `config.{AI_PROVIDER}.yml` (`openai` when unset).
/// - Top-level keys like `port` and `db_url` are overridden by `PORT` and `DB_URL`.
/// - Nested keys are overridden by `DOCRAG_...` variables (e.g., `DOCRAG_EMBEDDING__API_URL`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");

    let main_config_path = if let Some(override_path) = config_path_override {
        override_path.to_string()
    } else {
        let user_config_path = format!("{base_path}/config.yml");
        if std::path::Path::new(&user_config_path).exists() {
            info!("Loading user-defined configuration from '{user_config_path}'.");
            user_config_path
        } else {
            let provider = env::var("AI_PROVIDER").unwrap_or_else(|_| "openai".to_string());
            let fallback_path = format!("{base_path}/config.{provider}.yml");
            info!("'{user_config_path}' not found. Falling back to '{fallback_path}' based on AI_PROVIDER='{provider}'.");
            fallback_path
        }
    };

    let main_content = read_and_substitute(&main_config_path)?.ok_or_else(|| {
        ConfigError::NotFound(format!(
            "Main config file not found at '{main_config_path}'. Please ensure 'config.yml' exists or your AI_PROVIDER is set to load a valid template ('openai' or 'gemini')."
        ))
    })?;

    let settings = ConfigBuilder::builder()
        .add_source(File::from_str(&main_content, FileFormat::Yaml))
        // Plain environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Prefixed environment variables for nested overrides.
        .add_source(
            Environment::with_prefix("DOCRAG")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
