//! Storage functionality for videorag-rs
//!
//! This module provides the vector store adapter over embedded SQLite.

pub mod database;
pub mod schema;

// Re-export main types
pub use database::{ChunkHit, VideoStore};

use serde::{Deserialize, Serialize};

/// Processing status of one video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoStatus {
    /// Registered, not yet picked up
    Pending,
    /// An ingestion job is working on it
    Processing,
    /// Fully ingested and queryable
    Ready,
    /// Ingestion exhausted its retry budget or hit a fatal error
    Failed,
    /// Owning session was purged
    Expired,
}

impl VideoStatus {
    /// Stable string form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
            VideoStatus::Expired => "expired",
        }
    }

    /// Parse the stored string form
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(VideoStatus::Pending),
            "processing" => Some(VideoStatus::Processing),
            "ready" => Some(VideoStatus::Ready),
            "failed" => Some(VideoStatus::Failed),
            "expired" => Some(VideoStatus::Expired),
            _ => None,
        }
    }
}

/// One video row: status, failure reason and job checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Video identifier
    pub video_id: String,
    /// Owning session
    pub session_id: String,
    /// Duration in seconds
    pub duration: f64,
    /// Processing status
    pub status: VideoStatus,
    /// Machine-readable error kind when failed
    pub failure_kind: Option<String>,
    /// Human-readable failure reason when failed
    pub failure_reason: Option<String>,
    /// Last completed ingestion step (job checkpoint)
    pub last_step: Option<String>,
}
