//! External model provider interfaces
//!
//! Speech-to-text, vision, embedding and reasoning calls are abstracted
//! behind narrow single-method traits so the pipeline's correctness tests run
//! against deterministic fakes instead of live network calls.

pub mod fake;
pub mod openai;

pub use openai::{OpenAiCaptioner, OpenAiEmbedder, OpenAiReasoner, OpenAiTranscriber};

use crate::error::Result;
use crate::segment::{FrameCaption, TranscriptWindow};
use async_trait::async_trait;

/// One extracted audio slice handed to the speech-to-text provider
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Slice start in seconds, relative to the video
    pub start: f64,
    /// Slice end in seconds
    pub end: f64,
    /// Encoded audio payload (e.g. mp3)
    pub data: Vec<u8>,
}

/// One sampled key frame handed to the vision provider
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame timestamp in seconds
    pub ts: f64,
    /// JPEG-encoded frame payload
    pub jpeg: Vec<u8>,
}

/// Speech-to-text provider
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one audio slice into transcript windows.
    ///
    /// Fails with [`crate::error::VideoRagError::TransientProvider`] on
    /// retryable outages and [`crate::error::VideoRagError::InvalidInput`]
    /// when the audio itself is unusable.
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Vec<TranscriptWindow>>;
}

/// Vision/caption provider
#[async_trait]
pub trait VisionCaptioner: Send + Sync {
    /// Describe one key frame. Same failure taxonomy as [`SpeechToText`].
    async fn describe(&self, frame: &Frame) -> Result<FrameCaption>;
}

/// Batched, rate-limited embedding provider
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, pinned per session so query vectors stay in the same
    /// space as the ingested ones.
    fn model(&self) -> &str;

    /// Provider-imposed batch size ceiling.
    fn max_batch_size(&self) -> usize {
        64
    }
}

/// Reasoning/chat provider used for answer assembly
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Run one completion against the given system and user prompts.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
