//! # videorag-rs
//!
//! Turn uploaded videos into queryable, time-aligned knowledge bases and
//! answer natural-language questions against them with citations.
//!
//! A video is split into deterministic segments from its transcript windows,
//! enriched with frame captions, chunked and embedded into a session-scoped
//! vector store. Queries fuse vector similarity with lexical overlap and
//! return ranked segments; sessions expire on a TTL and their data is purged
//! once in-flight work drains.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use videorag_rs::{Config, VideoRagEngine, IngestRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = VideoRagEngine::new(Config::from_env()?)?;
//!     let session = engine.create_session()?;
//!
//!     // Audio slices and key frames come from an external extraction step
//!     let request = IngestRequest {
//!         session_id: session.session_id.clone(),
//!         video_id: "meeting-001".to_string(),
//!         duration: 1800.0,
//!         audio: vec![],
//!         frames: vec![],
//!     };
//!     let video = engine.ingest_video(&request).await?;
//!     println!("Video {} is {}", video.video_id, video.status.as_str());
//!
//!     let answer = engine
//!         .ask(&session.session_id, Some("meeting-001"), "What was decided?", 5)
//!         .await?;
//!     println!("{}", answer.answer);
//!
//!     engine.close_session(&session.session_id)?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod segment;
pub mod session;
pub mod storage;

// Re-export main API types
pub use api::{Answer, VideoRagEngine};
pub use config::Config;
pub use error::{Result, VideoRagError};
pub use pipeline::IngestRequest;
pub use retrieval::{RetrievalFilters, RetrievalOutput, RetrievalQuery, RetrievalResult};

// Re-export commonly used types
pub use segment::Segment;
pub use session::{Session, SessionState};
pub use storage::{VideoRecord, VideoStatus, VideoStore};
