//! Configuration for videorag-rs
//!
//! Every tunable named by the configuration surface lives here: provider
//! credentials, persistence path, segmentation and chunking windows, session
//! TTL, retry limits and the retrieval fusion weights. Values come from
//! `Default` impls, optionally overridden by `VIDEORAG_*` environment
//! variables.

use crate::error::{Result, VideoRagError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider credentials and endpoints
    pub provider: ProviderConfig,
    /// Segment boundary settings
    pub segmentation: SegmentationConfig,
    /// Chunking settings for the embedding pipeline
    pub chunking: ChunkingConfig,
    /// Embedding provider settings
    pub embedding: EmbeddingConfig,
    /// Retrieval and score fusion settings
    pub retrieval: RetrievalConfig,
    /// Session lifecycle settings
    pub session: SessionConfig,
    /// Retry budgets and backoff
    pub retry: RetryConfig,
    /// Path to the SQLite database file (":memory:" for tests)
    pub database_path: String,
}

/// Provider credentials and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key for the OpenAI-compatible endpoint
    pub api_key: String,
    /// Optional base URL for OpenAI-compatible APIs
    pub base_url: Option<String>,
    /// Speech-to-text model
    pub transcription_model: String,
    /// Vision/caption model
    pub vision_model: String,
    /// Chat model used for answer assembly
    pub chat_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            transcription_model: "whisper-1".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Segment boundary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Fixed segment interval in seconds, used when transcript windows are
    /// coarser than this value
    pub segment_interval: f64,
    /// Transcript windows longer than this are re-split at fixed intervals
    pub max_window_seconds: f64,
    /// Key frames sampled per second during extraction
    pub frame_sample_fps: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            segment_interval: 30.0,
            max_window_seconds: 60.0,
            frame_sample_fps: 1.0,
        }
    }
}

/// Chunking settings for the embedding pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum tokens per embedding chunk
    pub max_tokens: usize,
    /// Whether caption text is appended to the transcript before chunking
    pub include_captions: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            include_captions: true,
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model, pinned per session to keep vector spaces compatible
    pub model: String,
    /// Maximum texts per provider request
    pub batch_size: usize,
    /// Concurrent batch requests in flight
    pub parallelism: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            batch_size: 64,
            parallelism: 4,
        }
    }
}

/// Retrieval and score fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched per requested result before post-filtering
    pub overfetch_factor: usize,
    /// Weight of the normalized vector similarity in the fused score
    pub vector_weight: f32,
    /// Weight of the lexical overlap score in the fused score
    pub lexical_weight: f32,
    /// Query timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 4,
            vector_weight: 0.7,
            lexical_weight: 0.3,
            timeout_ms: 10_000,
        }
    }
}

impl RetrievalConfig {
    /// Query timeout as a `Duration`.
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Absolute TTL in seconds; sessions expire this long after creation
    pub ttl_seconds: u64,
    /// Polling interval of the cleanup sweep
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            sweep_interval_seconds: 60,
        }
    }
}

/// Retry budgets and backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per provider call before the error propagates
    pub max_attempts: usize,
    /// Base delay of the exponential backoff
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl Config {
    /// Build a config from defaults plus `VIDEORAG_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            database_path: "videorag.db".to_string(),
            ..Config::default()
        };

        if let Ok(key) = std::env::var("VIDEORAG_API_KEY") {
            config.provider.api_key = key;
        }
        if let Ok(url) = std::env::var("VIDEORAG_BASE_URL") {
            config.provider.base_url = Some(url);
        }
        if let Ok(path) = std::env::var("VIDEORAG_DATABASE_PATH") {
            config.database_path = path;
        }
        if let Ok(val) = std::env::var("VIDEORAG_EMBEDDING_WINDOW") {
            config.chunking.max_tokens = parse_env("VIDEORAG_EMBEDDING_WINDOW", &val)?;
        }
        if let Ok(val) = std::env::var("VIDEORAG_FRAME_SAMPLE_FPS") {
            config.segmentation.frame_sample_fps = parse_env("VIDEORAG_FRAME_SAMPLE_FPS", &val)?;
        }
        if let Ok(val) = std::env::var("VIDEORAG_SESSION_TTL") {
            config.session.ttl_seconds = parse_env("VIDEORAG_SESSION_TTL", &val)?;
        }
        if let Ok(val) = std::env::var("VIDEORAG_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env("VIDEORAG_MAX_ATTEMPTS", &val)?;
        }
        if let Ok(val) = std::env::var("VIDEORAG_OVERFETCH_FACTOR") {
            config.retrieval.overfetch_factor = parse_env("VIDEORAG_OVERFETCH_FACTOR", &val)?;
        }
        if let Ok(val) = std::env::var("VIDEORAG_VECTOR_WEIGHT") {
            config.retrieval.vector_weight = parse_env("VIDEORAG_VECTOR_WEIGHT", &val)?;
        }
        if let Ok(val) = std::env::var("VIDEORAG_LEXICAL_WEIGHT") {
            config.retrieval.lexical_weight = parse_env("VIDEORAG_LEXICAL_WEIGHT", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that would otherwise surface deep in the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            return Err(VideoRagError::Config(
                "embedding window size must be positive".to_string(),
            ));
        }
        if self.retrieval.overfetch_factor == 0 {
            return Err(VideoRagError::Config(
                "overfetch factor must be at least 1".to_string(),
            ));
        }
        if self.segmentation.segment_interval <= 0.0 {
            return Err(VideoRagError::Config(
                "segment interval must be positive".to_string(),
            ));
        }
        let weight_sum = self.retrieval.vector_weight + self.retrieval.lexical_weight;
        if weight_sum <= 0.0 {
            return Err(VideoRagError::Config(
                "fusion weights must not both be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Session TTL as a `Duration`.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_seconds)
    }

    /// Retrieval query timeout as a `Duration`.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval.timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| VideoRagError::Config(format!("invalid value for {}: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.chunking.max_tokens, 512);
        assert_eq!(config.segmentation.segment_interval, 30.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = Config::default();
        config.chunking.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_weights() {
        let mut config = Config::default();
        config.retrieval.vector_weight = 0.0;
        config.retrieval.lexical_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.embedding.model, config.embedding.model);
    }
}
