//! Configuration management for the knowledge-graph core.
//!
//! Separates secrets (from environment variables) from settings (from a
//! TOML file).
//!
//! # Configuration sources
//!
//! ## Secrets (environment variables)
//! - `SEMANTIC_SCHOLAR_API_KEY`, `OPENALEX_MAILTO`
//! - `GRAPH_URI`, `GRAPH_USERNAME`, `GRAPH_PASSWORD`
//! - `EMBEDDING_API_KEY`, `LLM_API_KEY`
//!
//! ## Settings (TOML file)
//! Located at `~/.config/paper-kg/config.toml`: cache directory/size,
//! per-source rate limits and timeouts, retry/backoff knobs, matcher
//! thresholds, segmenter/extractor/relation settings, batch processor
//! settings, and the embedding provider's base URL/model/dimension.

mod secrets;
mod settings;

pub use secrets::{Secrets, SecretsError};
pub use settings::{
    BatchSettings, CacheSettings, EmbeddingSettings, ExtractorSettings, GraphSettings,
    LoggingSettings, MatcherSettings, RelationSettings, RetrySettings, SearchSettings,
    SegmenterSettings, Settings, SettingsError, SourceLimit, SourceSettings,
};

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub secrets: Secrets,
    pub settings: Settings,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl Config {
    /// Load configuration from all sources: env secrets, then TOML settings
    /// (creating a default settings file if one doesn't exist yet).
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env()?;
        let settings = Settings::load()?;
        Ok(Self { secrets, settings })
    }
}

/// Load a `.env` file if present (development convenience). Called
/// automatically by [`Config::load`] via [`Secrets::from_env`], but exported
/// for callers (e.g. tests, binaries) that need it before constructing a
/// `Config`.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn load_succeeds_without_any_secrets_configured() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe {
            env::remove_var("EMBEDDING_API_KEY");
            env::remove_var("LLM_API_KEY");
        }
        // Config::load never fails on missing secrets; individual components
        // that need a key call require_*_key() and fail at point of use.
        let config = Config {
            secrets: Secrets::from_env_inner(),
            settings: Settings::default(),
        };
        assert!(config.secrets.embedding_api_key.is_none());
        assert_eq!(config.settings.matcher.high_threshold, 0.95);
    }
}
