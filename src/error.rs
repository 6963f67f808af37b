//! Error types for videorag-rs
//!
//! This module provides the error taxonomy shared by the ingestion pipeline,
//! the retriever and the session lifecycle manager. Retryable and fatal
//! failures are distinguished so the orchestrator can decide between backoff
//! and marking a video as failed.

use thiserror::Error;

/// Main error type for videorag operations
#[derive(Error, Debug)]
pub enum VideoRagError {
    /// Transient provider failure (rate limit, network blip) - retry with backoff
    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    /// Invalid input (corrupt audio, unreadable frame) - fatal, no retry
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Video has no usable content at all (no transcript and no captions)
    #[error("Empty ingestion: {0}")]
    EmptyIngestion(String),

    /// Operation against a session that is no longer active
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Embedding retry budget exhausted - the owning video becomes `failed`
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// Storage layer unavailable - retryable at the adapter layer
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Retrieval query exceeded its caller-specified timeout
    #[error("Query timed out after {0} ms")]
    QueryTimeout(u64),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(String),
}

impl VideoRagError {
    /// Whether the orchestrator should retry the failed step with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VideoRagError::TransientProvider(_) | VideoRagError::StorageUnavailable(_)
        )
    }

    /// Short machine-readable kind, recorded as the failure reason on a video.
    pub fn kind(&self) -> &'static str {
        match self {
            VideoRagError::TransientProvider(_) => "transient_provider",
            VideoRagError::InvalidInput(_) => "invalid_input",
            VideoRagError::EmptyIngestion(_) => "empty_ingestion",
            VideoRagError::SessionExpired(_) => "session_expired",
            VideoRagError::EmbeddingProvider(_) => "embedding_provider",
            VideoRagError::StorageUnavailable(_) => "storage_unavailable",
            VideoRagError::QueryTimeout(_) => "query_timeout",
            VideoRagError::Config(_) => "config",
            VideoRagError::Io(_) => "io",
            VideoRagError::Json(_) => "json",
            VideoRagError::Database(_) => "database",
            VideoRagError::Generic(_) => "generic",
        }
    }
}

/// Result type alias for videorag operations
pub type Result<T> = std::result::Result<T, VideoRagError>;

impl From<anyhow::Error> for VideoRagError {
    fn from(err: anyhow::Error) -> Self {
        VideoRagError::Generic(err.to_string())
    }
}
