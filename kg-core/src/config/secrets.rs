//! Secrets configuration loaded from environment variables only.
//!
//! This module handles sensitive configuration — API keys and graph store
//! credentials — that should never be stored in files. All secrets are read
//! from environment variables, mirroring the "Environment inputs" contract
//! of the system spec (§6): graph URI/credentials, embedding and LLM keys.

use std::env;

/// Secrets loaded exclusively from environment variables.
///
/// These are sensitive values that should never be written to disk or
/// committed to version control.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// Semantic Scholar API key (env: `SEMANTIC_SCHOLAR_API_KEY`). Optional —
    /// the public API works unauthenticated at a lower rate limit.
    pub semantic_scholar_api_key: Option<String>,

    /// OpenAlex polite-pool contact email (env: `OPENALEX_MAILTO`).
    pub openalex_mailto: Option<String>,

    /// Graph store connection URI (env: `GRAPH_URI`).
    pub graph_uri: Option<String>,

    /// Graph store username (env: `GRAPH_USERNAME`).
    pub graph_username: Option<String>,

    /// Graph store password (env: `GRAPH_PASSWORD`).
    pub graph_password: Option<String>,

    /// Embedding provider API key (env: `EMBEDDING_API_KEY`).
    pub embedding_api_key: Option<String>,

    /// LLM provider API key (env: `LLM_API_KEY`).
    pub llm_api_key: Option<String>,
}

/// Errors that can occur when loading secrets.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("missing required secret: {0}")]
    MissingSecret(String),
}

impl Secrets {
    /// Load secrets from environment variables.
    ///
    /// Also loads a `.env` file if present (development convenience); in
    /// production the real process environment takes precedence since
    /// `dotenvy::dotenv()` never overwrites variables already set.
    pub fn from_env() -> Result<Self, SecretsError> {
        let _ = dotenvy::dotenv();
        Ok(Self::from_env_inner())
    }

    /// Internal method to load from environment without loading `.env`.
    pub(crate) fn from_env_inner() -> Self {
        Self {
            semantic_scholar_api_key: env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
            openalex_mailto: env::var("OPENALEX_MAILTO").ok(),
            graph_uri: env::var("GRAPH_URI").ok(),
            graph_username: env::var("GRAPH_USERNAME").ok(),
            graph_password: env::var("GRAPH_PASSWORD").ok(),
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok(),
            llm_api_key: env::var("LLM_API_KEY").ok(),
        }
    }

    /// Require the embedding API key, surfacing a typed error if absent.
    pub fn require_embedding_key(&self) -> Result<&str, SecretsError> {
        self.embedding_api_key
            .as_deref()
            .ok_or_else(|| SecretsError::MissingSecret("EMBEDDING_API_KEY".to_string()))
    }

    /// Require the LLM API key, surfacing a typed error if absent.
    pub fn require_llm_key(&self) -> Result<&str, SecretsError> {
        self.llm_api_key
            .as_deref()
            .ok_or_else(|| SecretsError::MissingSecret("LLM_API_KEY".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        unsafe {
            env::remove_var("SEMANTIC_SCHOLAR_API_KEY");
            env::remove_var("OPENALEX_MAILTO");
            env::remove_var("GRAPH_URI");
            env::remove_var("EMBEDDING_API_KEY");
            env::remove_var("LLM_API_KEY");
        }
    }

    #[test]
    fn missing_secrets_are_none_by_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let secrets = Secrets::from_env_inner();
        assert!(secrets.embedding_api_key.is_none());
        assert!(secrets.llm_api_key.is_none());
    }

    #[test]
    fn require_embedding_key_errors_when_absent() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let secrets = Secrets::from_env_inner();
        assert!(matches!(
            secrets.require_embedding_key(),
            Err(SecretsError::MissingSecret(_))
        ));
    }

    #[test]
    fn loads_configured_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("OPENALEX_MAILTO", "team@example.com");
            env::set_var("LLM_API_KEY", "sk-test");
        }
        let secrets = Secrets::from_env_inner();
        assert_eq!(secrets.openalex_mailto.as_deref(), Some("team@example.com"));
        assert_eq!(secrets.require_llm_key().unwrap(), "sk-test");
    }
}
