//! videorag-rs CLI application
//!
//! Command-line interface for the videorag-rs library. Ingestion takes a
//! manifest describing pre-extracted audio slices and key frames, since media
//! decoding happens outside this tool.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use videorag_rs::providers::{AudioChunk, Frame};
use videorag_rs::{
    Config, IngestRequest, RetrievalFilters, RetrievalQuery, VideoRagEngine,
};

#[derive(Parser)]
#[command(name = "videorag-rs")]
#[command(about = "Session-scoped video knowledge bases with cited answers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new session and print its id
    NewSession,

    /// Ingest a video from an extraction manifest
    Ingest {
        /// Session the video belongs to
        #[arg(short, long)]
        session: String,

        /// Stable video id, reused to resume an interrupted ingest
        #[arg(long)]
        video_id: String,

        /// Video duration in seconds
        #[arg(long)]
        duration: f64,

        /// Manifest JSON listing audio slices and key frames
        manifest: PathBuf,
    },

    /// Search a session's videos and print ranked segments
    Query {
        /// Session to search
        #[arg(short, long)]
        session: String,

        /// Restrict to one video
        #[arg(long)]
        video_id: Option<String>,

        /// Search prompt
        prompt: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Ask a question and get a cited answer
    Ask {
        /// Session to search
        #[arg(short, long)]
        session: String,

        /// Restrict to one video
        #[arg(long)]
        video_id: Option<String>,

        /// The question to ask
        question: String,

        /// Segments to retrieve as evidence
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Show the processing status of a video
    Status {
        /// Video id to inspect
        video_id: String,
    },

    /// Close a session and purge its data once in-flight work drains
    Purge {
        /// Session to close
        session: String,
    },
}

/// Extraction manifest: where the pre-decoded media lives on disk
#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    audio: Vec<ManifestAudio>,
    #[serde(default)]
    frames: Vec<ManifestFrame>,
}

#[derive(Deserialize)]
struct ManifestAudio {
    start: f64,
    end: f64,
    path: PathBuf,
}

#[derive(Deserialize)]
struct ManifestFrame {
    ts: f64,
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    let engine = VideoRagEngine::new(Config::from_env()?)?;

    match cli.command {
        Commands::NewSession => {
            let session = engine.create_session()?;
            println!("✅ Session created: {}", session.session_id);
        }
        Commands::Ingest {
            session,
            video_id,
            duration,
            manifest,
        } => {
            ingest_command(&engine, session, video_id, duration, manifest).await?;
        }
        Commands::Query {
            session,
            video_id,
            prompt,
            top_k,
        } => {
            query_command(&engine, session, video_id, prompt, top_k).await?;
        }
        Commands::Ask {
            session,
            video_id,
            question,
            top_k,
        } => {
            let answer = engine
                .ask(&session, video_id.as_deref(), &question, top_k)
                .await?;
            println!("💬 {}", answer.answer);
            for segment in &answer.supporting_segments {
                println!(
                    "   📎 [{:.1}s - {:.1}s] ({:.3}) {}",
                    segment.start, segment.end, segment.confidence, segment.segment_id
                );
            }
            if !answer.follow_up_questions.is_empty() {
                println!("   ❓ Follow-ups:");
                for q in &answer.follow_up_questions {
                    println!("      - {}", q);
                }
            }
        }
        Commands::Status { video_id } => {
            match engine.video_status(&video_id)? {
                Some(video) => {
                    println!("📹 {}: {}", video.video_id, video.status.as_str());
                    if let Some(step) = &video.last_step {
                        println!("   Last completed step: {}", step);
                    }
                    if let Some(reason) = &video.failure_reason {
                        println!("   ❌ Failure: {}", reason);
                    }
                }
                None => println!("❌ Unknown video: {}", video_id),
            }
        }
        Commands::Purge { session } => {
            engine.close_session(&session)?;
            let purged = engine.sweep_sessions()?;
            println!("✅ Session {} closed ({} purged)", session, purged);
        }
    }

    Ok(())
}

async fn ingest_command(
    engine: &VideoRagEngine,
    session: String,
    video_id: String,
    duration: f64,
    manifest_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🎬 Ingesting {} from {}", video_id, manifest_path.display());

    let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;

    let mut audio = Vec::new();
    for entry in manifest.audio {
        audio.push(AudioChunk {
            start: entry.start,
            end: entry.end,
            data: std::fs::read(&entry.path)?,
        });
    }
    let mut frames = Vec::new();
    for entry in manifest.frames {
        frames.push(Frame {
            ts: entry.ts,
            jpeg: std::fs::read(&entry.path)?,
        });
    }

    let request = IngestRequest {
        session_id: session,
        video_id,
        duration,
        audio,
        frames,
    };
    let video = engine.ingest_video(&request).await?;

    println!("✅ Ingestion complete!");
    println!("   📹 Video: {}", video.video_id);
    println!("   📊 Status: {}", video.status.as_str());
    Ok(())
}

async fn query_command(
    engine: &VideoRagEngine,
    session: String,
    video_id: Option<String>,
    prompt: String,
    top_k: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Searching for: \"{}\"", prompt);

    let output = engine
        .search(&RetrievalQuery {
            session_id: session,
            video_id,
            prompt,
            top_k,
            filters: RetrievalFilters::default(),
            timeout: None,
        })
        .await?;

    if output.results.is_empty() {
        println!("❌ No results found");
        return Ok(());
    }

    println!("📋 Found {} results:", output.results.len());
    println!();
    for (i, result) in output.results.iter().enumerate() {
        println!(
            "{}. [{:.1}s - {:.1}s] Score: {:.3}",
            i + 1,
            result.start,
            result.end,
            result.confidence
        );
        println!("   {}", result.evidence);
        println!();
    }

    Ok(())
}
