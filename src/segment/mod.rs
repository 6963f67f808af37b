//! Segment model and builder for videorag-rs
//!
//! This module turns raw transcript windows and frame captions into the
//! canonical, time-ordered segment documents that the embedding pipeline and
//! the retriever operate on.

pub mod builder;

pub use builder::SegmentBuilder;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A fixed-size transcribed audio slice, ephemeral input to the builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWindow {
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds
    pub end: f64,
    /// Transcribed text for the window
    pub text: String,
}

/// Description of one sampled key frame, ephemeral input to the builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameCaption {
    /// Timestamp of the frame in seconds
    pub frame_ts: f64,
    /// Natural-language description of the frame
    pub description: String,
    /// Objects detected in the frame
    pub objects: Vec<String>,
    /// Text visible in the frame (OCR)
    pub text: String,
}

/// The canonical retrieval unit: a contiguous time slice of one video
///
/// Captions are retained as structured objects rather than flattened into the
/// transcript, preserving provenance for answer assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Deterministic id derived from (video_id, start, end)
    pub segment_id: String,
    /// Owning video
    pub video_id: String,
    /// Segment start in seconds, inclusive
    pub start: f64,
    /// Segment end in seconds, exclusive
    pub end: f64,
    /// Merged transcript text for `[start, end)`
    pub transcript: String,
    /// Frame captions whose timestamp falls inside the segment, time-ordered
    pub captions: Vec<FrameCaption>,
    /// Ids of the embedding chunks derived from this segment
    pub chunk_embedding_ids: Vec<String>,
}

impl Segment {
    /// Deterministic segment id. Re-ingesting the same video slice always
    /// yields the same id, so upserts replace instead of duplicating.
    pub fn make_id(video_id: &str, start: f64, end: f64) -> String {
        let start_ms = (start * 1000.0).round() as u64;
        let end_ms = (end * 1000.0).round() as u64;
        let mut hasher = Sha256::new();
        hasher.update(video_id.as_bytes());
        hasher.update(b"|");
        hasher.update(start_ms.to_le_bytes());
        hasher.update(end_ms.to_le_bytes());
        let digest = hasher.finalize();
        format!(
            "seg-{:08}-{:08}-{:02x}{:02x}{:02x}{:02x}",
            start_ms, end_ms, digest[0], digest[1], digest[2], digest[3]
        )
    }

    /// Whether `ts` falls inside the segment's half-open interval.
    pub fn contains(&self, ts: f64) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Caption text flattened for embedding, empty when there are no captions.
    pub fn caption_text(&self) -> String {
        self.captions
            .iter()
            .map(|c| {
                let mut parts = vec![c.description.clone()];
                if !c.objects.is_empty() {
                    parts.push(format!("Objects: {}", c.objects.join(", ")));
                }
                if !c.text.is_empty() {
                    parts.push(format!("On-screen text: {}", c.text));
                }
                parts.join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
