//! Settings configuration loaded from TOML files.
//!
//! Non-sensitive configuration stored in TOML format in the XDG config
//! directory (`~/.config/paper-kg/config.toml`). Secrets (§6 "Environment
//! inputs": graph/embedding/LLM credentials) live in [`super::secrets`]
//! instead.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings loaded from the TOML configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// PDF/metadata cache configuration (C6).
    #[serde(default)]
    pub cache: CacheSettings,

    /// Per-source rate limiting and timeouts (C1, C5).
    #[serde(default)]
    pub sources: SourceSettings,

    /// Retry-with-backoff configuration (C3).
    #[serde(default)]
    pub retry: RetrySettings,

    /// Section segmentation configuration (C10).
    #[serde(default)]
    pub segmenter: SegmenterSettings,

    /// Problem extraction configuration (C11).
    #[serde(default)]
    pub extractor: ExtractorSettings,

    /// Relation extraction configuration (C12).
    #[serde(default)]
    pub relations: RelationSettings,

    /// Batch job queue + processor configuration (C14, C15).
    #[serde(default)]
    pub batch: BatchSettings,

    /// Concept matcher confidence thresholds (C16).
    #[serde(default)]
    pub matcher: MatcherSettings,

    /// Embedding provider configuration (consumed as `text -> vector`).
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Graph store configuration (C19).
    #[serde(default)]
    pub graph: GraphSettings,

    /// Search service configuration (C20).
    #[serde(default)]
    pub search: SearchSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            sources: SourceSettings::default(),
            retry: RetrySettings::default(),
            segmenter: SegmenterSettings::default(),
            extractor: ExtractorSettings::default(),
            relations: RelationSettings::default(),
            batch: BatchSettings::default(),
            matcher: MatcherSettings::default(),
            embedding: EmbeddingSettings::default(),
            graph: GraphSettings::default(),
            search: SearchSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// PDF cache settings (C6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Root directory for the cache (`cache.db` + sharded PDF files).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Eviction ceiling, in bytes. Eviction runs down to 80% of this value.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_size_bytes: default_max_size_bytes(),
        }
    }
}

fn default_cache_dir() -> String {
    "paper-kg-cache".to_string()
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024 * 1024 // 10 GiB
}

/// Per-source rate limit + timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSettings {
    #[serde(default = "default_source_limit")]
    pub semantic_scholar: SourceLimit,
    #[serde(default = "default_source_limit")]
    pub arxiv: SourceLimit,
    #[serde(default = "default_source_limit")]
    pub openalex: SourceLimit,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            semantic_scholar: default_source_limit(),
            arxiv: default_source_limit(),
            openalex: default_source_limit(),
        }
    }
}

/// Token-bucket + timeout + breaker configuration for a single source (C1, C2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceLimit {
    /// Tokens refilled per second.
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
    /// Bucket burst capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Consecutive failures before the breaker trips OPEN.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Rolling window, in seconds, over which consecutive failures count.
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,
    /// OPEN -> HALF_OPEN cooldown, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_source_limit() -> SourceLimit {
    SourceLimit {
        refill_per_sec: default_refill_per_sec(),
        burst: default_burst(),
        timeout_secs: default_timeout_secs(),
        failure_threshold: default_failure_threshold(),
        failure_window_secs: default_failure_window_secs(),
        cooldown_secs: default_cooldown_secs(),
    }
}

fn default_refill_per_sec() -> f64 {
    1.0
}
fn default_burst() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_failure_window_secs() -> u64 {
    60
}
fn default_cooldown_secs() -> u64 {
    30
}

/// Retry-with-backoff configuration (C3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}

/// Section segmenter configuration (C10).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SegmenterSettings {
    #[serde(default = "default_max_heading_length")]
    pub max_heading_length: usize,
    #[serde(default = "default_min_section_words")]
    pub min_section_words: usize,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            max_heading_length: default_max_heading_length(),
            min_section_words: default_min_section_words(),
        }
    }
}

fn default_max_heading_length() -> usize {
    100
}
fn default_min_section_words() -> usize {
    20
}

/// Problem extractor configuration (C11).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorSettings {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_problems_per_section")]
    pub max_problems_per_section: usize,
    #[serde(default = "default_max_section_priority")]
    pub max_section_priority: i32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_on_empty: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_problems_per_section: default_max_problems_per_section(),
            max_section_priority: default_max_section_priority(),
            max_retries: default_max_retries(),
            retry_on_empty: true,
        }
    }
}

fn default_min_confidence() -> f64 {
    0.5
}
fn default_max_problems_per_section() -> usize {
    10
}
fn default_max_section_priority() -> i32 {
    100
}

/// Relation extractor configuration (C12).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationSettings {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_min_relation_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_cue_window_chars")]
    pub cue_window_chars: usize,
    #[serde(default = "default_word_overlap_threshold")]
    pub word_overlap_threshold: f64,
}

impl Default for RelationSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_confidence: default_min_relation_confidence(),
            cue_window_chars: default_cue_window_chars(),
            word_overlap_threshold: default_word_overlap_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_min_relation_confidence() -> f64 {
    0.3
}
fn default_cue_window_chars() -> usize {
    100
}
fn default_word_overlap_threshold() -> f64 {
    0.3
}

/// Batch job queue + processor configuration (C14, C15).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchSettings {
    /// Path to the job-queue SQLite database, or `:memory:`.
    #[serde(default = "default_batch_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub store_to_kg: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            db_path: default_batch_db_path(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            store_to_kg: true,
        }
    }
}

fn default_batch_db_path() -> String {
    "batch.db".to_string()
}
fn default_max_concurrent() -> usize {
    4
}
fn default_retry_delay_ms() -> u64 {
    2_000
}
fn default_true() -> bool {
    true
}

/// Concept matcher confidence-band thresholds (C16).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatcherSettings {
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    #[serde(default = "default_citation_boost")]
    pub citation_boost: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            low_threshold: default_low_threshold(),
            citation_boost: default_citation_boost(),
            top_k: default_top_k(),
        }
    }
}

fn default_high_threshold() -> f64 {
    0.95
}
fn default_medium_threshold() -> f64 {
    0.80
}
fn default_low_threshold() -> f64 {
    0.50
}
fn default_citation_boost() -> f64 {
    0.20
}
fn default_top_k() -> usize {
    10
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Fixed embedding dimension, `D` (§6: `D = 1536`).
    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dim() -> usize {
    1536
}

/// Graph store configuration (C19). The spec treats the graph driver
/// itself as an external collaborator (§1); this crate's `Repository`
/// implementation is SQLite + `sqlite-vec`-backed (see kg-graph/DESIGN.md
/// for why), so the only knob here is where that file lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphSettings {
    /// Path to the graph store's SQLite database, or `:memory:`.
    #[serde(default = "default_graph_db_path")]
    pub db_path: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self { db_path: default_graph_db_path() }
    }
}

fn default_graph_db_path() -> String {
    "graph.db".to_string()
}

/// Search service configuration (C20).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_search_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_deduplication_threshold")]
    pub deduplication_threshold: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_top_k: default_search_top_k(),
            similarity_threshold: default_search_similarity_threshold(),
            semantic_weight: default_semantic_weight(),
            deduplication_threshold: default_deduplication_threshold(),
        }
    }
}

fn default_search_top_k() -> usize {
    10
}
fn default_search_similarity_threshold() -> f64 {
    0.5
}

fn default_semantic_weight() -> f64 {
    0.6
}
fn default_deduplication_threshold() -> f64 {
    0.95
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Errors that can occur when loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file, creating a default
    /// one at `~/.config/paper-kg/config.toml` if it doesn't exist yet.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("creating default configuration at {:?}", config_path);
            Self::default().save_to_path(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn config_path() -> Result<PathBuf, SettingsError> {
        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("paper-kg");
        Ok(config_dir.join("config.toml"))
    }

    pub fn save_to_path(&self, path: &PathBuf) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_thresholds() {
        let settings = Settings::default();
        assert_eq!(settings.matcher.high_threshold, 0.95);
        assert_eq!(settings.matcher.medium_threshold, 0.80);
        assert_eq!(settings.matcher.low_threshold, 0.50);
        assert_eq!(settings.matcher.citation_boost, 0.20);
        assert_eq!(settings.embedding.dimension, 1536);
    }

    #[test]
    fn from_toml_partial_fills_defaults() {
        let toml = r#"
[cache]
max_size_bytes = 1024
"#;
        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(settings.cache.max_size_bytes, 1024);
        assert_eq!(settings.batch.max_concurrent, 4);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let mut settings = Settings::default();
        settings.batch.max_concurrent = 8;
        let path = std::env::temp_dir().join(format!(
            "paper_kg_settings_test_{}.toml",
            uuid::Uuid::new_v4()
        ));
        settings.save_to_path(&path).unwrap();
        let loaded = Settings::from_toml(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.batch.max_concurrent, 8);
        let _ = fs::remove_file(path);
    }
}
