//! Hybrid retrieval over embedded video segments

pub mod fusion;
pub mod retriever;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use retriever::HybridRetriever;

/// One retrieval request against a session's indexed videos
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    /// Session whose content is searched
    pub session_id: String,
    /// Restrict to one video, or search the whole session
    pub video_id: Option<String>,
    /// Natural-language prompt
    pub prompt: String,
    /// Maximum results returned
    pub top_k: usize,
    /// Metadata post-filters
    pub filters: RetrievalFilters,
    /// Per-query timeout override
    pub timeout: Option<Duration>,
}

/// Metadata filters applied after the vector search
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    /// Keep segments overlapping `[lo, hi)` in seconds
    pub time_range: Option<(f64, f64)>,
    /// Keep segments whose captions mention any of these tags
    pub tags: Vec<String>,
}

/// One ranked segment in a retrieval response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub segment_id: String,
    /// Segment start in seconds
    pub start: f64,
    /// Segment end in seconds
    pub end: f64,
    /// Fused vector + lexical score in [0, 1]
    pub confidence: f32,
    /// Best-matching chunk text from the segment
    pub evidence: String,
}

/// Ranked results for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutput {
    pub query: String,
    pub results: Vec<RetrievalResult>,
}
