//! Deterministic segment chunking
//!
//! Splits a segment's text into token windows of at most `max_tokens`.
//! Boundaries depend only on the text and the window size, so re-running the
//! chunker on unchanged input reproduces the exact same chunk ids.

use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingChunk;
use crate::segment::Segment;

/// Chunks segment text into embedding-sized windows
pub struct SegmentChunker {
    config: ChunkingConfig,
}

impl SegmentChunker {
    /// Create a chunker with the given settings
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Create a chunker with default settings (512-token windows)
    pub fn with_default_config() -> Self {
        Self::new(ChunkingConfig::default())
    }

    /// Chunk one segment. Caption text is appended after the transcript when
    /// configured, so both modalities are searchable. A segment with no text
    /// at all yields no chunks, which is not an error.
    pub fn chunk_segment(&self, segment: &Segment) -> Vec<EmbeddingChunk> {
        let mut text = segment.transcript.trim().to_string();
        if self.config.include_captions {
            let caption_text = segment.caption_text();
            if !caption_text.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&caption_text);
            }
        }

        self.chunk_text(&segment.segment_id, &text)
    }

    /// Token-window chunking with deterministic boundaries.
    fn chunk_text(&self, segment_id: &str, text: &str) -> Vec<EmbeddingChunk> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        tokens
            .chunks(self.config.max_tokens)
            .enumerate()
            .map(|(index, window)| {
                let chunk_text = window.join(" ");
                EmbeddingChunk {
                    chunk_id: EmbeddingChunk::make_id(segment_id, index, &chunk_text),
                    segment_id: segment_id.to_string(),
                    chunk_index: index,
                    text: chunk_text,
                    vector: Vec::new(),
                    token_count: window.len(),
                }
            })
            .collect()
    }
}
