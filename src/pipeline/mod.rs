//! Ingestion job orchestration
//!
//! Drives one video through extract, segment and embed, checkpointing the
//! last completed step in storage so an interrupted job resumes where it
//! stopped instead of redoing provider calls.

pub mod orchestrator;

use crate::providers::{AudioChunk, Frame};

pub use orchestrator::JobOrchestrator;

/// Last-completed-step markers persisted per video
pub(crate) const STEP_EXTRACT: &str = "extract";
pub(crate) const STEP_SEGMENT: &str = "segment";
pub(crate) const STEP_EMBED: &str = "embed";

/// Ordering of checkpoints, `None` meaning no step has completed
pub(crate) fn step_rank(step: Option<&str>) -> u8 {
    match step {
        None => 0,
        Some(STEP_EXTRACT) => 1,
        Some(STEP_SEGMENT) => 2,
        Some(STEP_EMBED) => 3,
        Some(_) => 0,
    }
}

/// One ingestion request: pre-extracted media for a single video
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Owning session
    pub session_id: String,
    /// Caller-assigned video id, stable across retries
    pub video_id: String,
    /// Video duration in seconds
    pub duration: f64,
    /// Extracted audio slices in playback order
    pub audio: Vec<AudioChunk>,
    /// Sampled key frames in playback order
    pub frames: Vec<Frame>,
}
