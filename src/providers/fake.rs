//! Deterministic fake providers
//!
//! These stand in for live model calls in tests. The fake embedder derives a
//! vector from token hashes, so identical text always maps to an identical
//! embedding and similar wording lands nearby.

use crate::error::{Result, VideoRagError};
use crate::providers::{AudioChunk, Frame, Reasoner, SpeechToText, TextEmbedder, VisionCaptioner};
use crate::segment::{FrameCaption, TranscriptWindow};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fake embedder producing deterministic hash-based vectors
pub struct FakeEmbedder {
    dimension: usize,
    model: String,
    /// Number of leading calls that fail with a transient error
    fail_first: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    /// Create a fake embedder with the given vector dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: "fake-embedding-v1".to_string(),
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make the first `n` embed calls fail with a transient provider error.
    pub fn fail_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Total embed calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deterministic embedding for one text, exposed for query-side reuse.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for (i, word) in text.to_lowercase().split_whitespace().enumerate() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();

            for j in 0..8.min(self.dimension) {
                let idx = (hash as usize).wrapping_add(j * 31) % self.dimension;
                embedding[idx] += ((hash >> (j * 7)) & 0x3F) as f32 / 64.0 - 0.5;
            }
            let pos = (i * 13) % self.dimension;
            embedding[pos] += 0.1;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-12 {
            for val in &mut embedding {
                *val /= norm;
            }
        }
        embedding
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait::async_trait]
impl TextEmbedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first.load(Ordering::SeqCst) {
            return Err(VideoRagError::TransientProvider(format!(
                "injected failure on call {}",
                call
            )));
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        16
    }
}

/// Fake transcriber returning pre-seeded windows
pub struct FakeTranscriber {
    windows: Vec<TranscriptWindow>,
}

impl FakeTranscriber {
    /// Create a transcriber that returns the given windows for any chunk
    pub fn new(windows: Vec<TranscriptWindow>) -> Self {
        Self { windows }
    }
}

#[async_trait::async_trait]
impl SpeechToText for FakeTranscriber {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Vec<TranscriptWindow>> {
        Ok(self
            .windows
            .iter()
            .filter(|w| w.start >= chunk.start && w.end <= chunk.end)
            .cloned()
            .collect())
    }
}

/// Fake captioner echoing a fixed description per frame timestamp
pub struct FakeCaptioner;

#[async_trait::async_trait]
impl VisionCaptioner for FakeCaptioner {
    async fn describe(&self, frame: &Frame) -> Result<FrameCaption> {
        Ok(FrameCaption {
            frame_ts: frame.ts,
            description: format!("frame at {:.1}s", frame.ts),
            objects: vec![],
            text: String::new(),
        })
    }
}

/// Fake reasoner echoing the user prompt back, useful for assembly tests
pub struct FakeReasoner {
    /// Canned reply; when empty the user prompt is echoed
    pub reply: String,
}

impl FakeReasoner {
    /// Create a reasoner with a canned reply
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Reasoner for FakeReasoner {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        if self.reply.is_empty() {
            Ok(user_prompt.to_string())
        } else {
            Ok(self.reply.clone())
        }
    }
}
