//! Per-run bot configuration.
//!
//! A [`BotConfig`] is read from a YAML file, overlaid with CLI/environment
//! values by the controller, validated, and then handed by value to the
//! worker. Nothing reads it again from global state, and it never changes
//! while the worker runs.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Topic queries the worker rotates through, one per iteration.
pub const DEFAULT_SEARCH_QUERIES: [&str; 12] = [
    "latest artificial intelligence breakthroughs",
    "new consumer electronics and gadgets",
    "advances in machine learning research",
    "innovative software development trends",
    "cutting-edge robotics technology news",
    "future of tech detailed analysis",
    "semiconductor industry news and chips",
    "virtual reality and augmented reality updates",
    "next generation AI models and applications",
    "wearable technology reviews and news",
    "space technology and commercial spaceflight",
    "cybersecurity threats and AI defense",
];

/// Terms that mark a search hit as on-topic for narrow queries.
pub const DEFAULT_TOPICAL_KEYWORDS: [&str; 25] = [
    "ai", "tech", "gadget", "robot", "software", "hardware", "innovation", "digital", "crypto",
    "cyber", "platform", "device", "wearable", "ar", "vr", "metaverse", "nvidia", "intel", "amd",
    "apple", "google", "microsoft", "amazon", "tesla", "spacex",
];

/// Connection settings for the OpenAI-compatible rewriting endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl LlmConfig {
    /// Default endpoint and model with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: default_api_base(),
            api_key: api_key.into(),
            model: default_model(),
        }
    }
}

/// Immutable configuration for one worker run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    /// Target Blogger blog identifier.
    #[serde(default)]
    pub blog_id: String,

    #[serde(default = "default_post_interval_minutes")]
    pub post_interval_minutes: u64,

    #[serde(default = "default_min_post_word_count")]
    pub min_post_word_count: usize,

    #[serde(default = "default_max_articles_to_combine")]
    pub max_articles_to_combine: usize,

    /// YouTube Data API key; related videos are skipped without it.
    #[serde(default)]
    pub youtube_api_key: Option<String>,

    /// Rewriting endpoint; enhancement is skipped without it.
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    #[serde(default = "default_search_queries")]
    pub search_queries: Vec<String>,

    #[serde(default = "default_topical_keywords")]
    pub topical_keywords: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            blog_id: String::new(),
            post_interval_minutes: default_post_interval_minutes(),
            min_post_word_count: default_min_post_word_count(),
            max_articles_to_combine: default_max_articles_to_combine(),
            youtube_api_key: None,
            llm: None,
            search_queries: default_search_queries(),
            topical_keywords: default_topical_keywords(),
        }
    }
}

impl BotConfig {
    /// Read a config file. Missing keys fall back to the defaults.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded bot configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blog_id.trim().is_empty() {
            return Err(ConfigError::Invalid("blog_id is required".into()));
        }
        if self.post_interval_minutes < 5 {
            return Err(ConfigError::Invalid(format!(
                "post_interval_minutes must be at least 5 (got {})",
                self.post_interval_minutes
            )));
        }
        if self.min_post_word_count < 500 {
            return Err(ConfigError::Invalid(format!(
                "min_post_word_count must be at least 500 (got {})",
                self.min_post_word_count
            )));
        }
        if !(1..=5).contains(&self.max_articles_to_combine) {
            return Err(ConfigError::Invalid(format!(
                "max_articles_to_combine must be between 1 and 5 (got {})",
                self.max_articles_to_combine
            )));
        }
        if self.search_queries.iter().all(|q| q.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "search_queries must contain at least one query".into(),
            ));
        }
        Ok(())
    }

    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval_minutes * 60)
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_post_interval_minutes() -> u64 {
    10
}

fn default_min_post_word_count() -> usize {
    1500
}

fn default_max_articles_to_combine() -> usize {
    3
}

fn default_search_queries() -> Vec<String> {
    DEFAULT_SEARCH_QUERIES.iter().map(|s| s.to_string()).collect()
}

fn default_topical_keywords() -> Vec<String> {
    DEFAULT_TOPICAL_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
