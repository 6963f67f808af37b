//! Embedding pipeline for videorag-rs
//!
//! Chunks segment text deterministically, requests vectors from the embedding
//! provider in bounded concurrent batches, and upserts the results so retried
//! jobs overwrite instead of duplicating.

pub mod chunking;
pub mod pipeline;

pub use chunking::SegmentChunker;
pub use pipeline::EmbeddingPipeline;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One embedded slice of a segment's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingChunk {
    /// Content-hash id derived from (segment_id, chunk_index, text)
    pub chunk_id: String,
    /// Owning segment
    pub segment_id: String,
    /// Position of this chunk within the segment
    pub chunk_index: usize,
    /// The chunk text that was embedded
    pub text: String,
    /// Embedding vector, empty until the pipeline fills it in
    pub vector: Vec<f32>,
    /// Whitespace token count, always `<= max_tokens`
    pub token_count: usize,
}

impl EmbeddingChunk {
    /// Content-hash chunk id. Unchanged text yields the same id, which is what
    /// makes cleanup-and-retry safe: a rerun upserts over the existing row.
    pub fn make_id(segment_id: &str, chunk_index: usize, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(segment_id.as_bytes());
        hasher.update(b"|");
        hasher.update((chunk_index as u64).to_le_bytes());
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let mut id = String::with_capacity(36);
        id.push_str("chk-");
        for byte in digest.iter().take(16) {
            id.push_str(&format!("{:02x}", byte));
        }
        id
    }
}
