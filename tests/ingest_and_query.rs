//! End-to-end ingestion and retrieval tests
//!
//! These run the full engine against deterministic fake providers and a
//! temporary on-disk database.

use std::sync::Arc;
use videorag_rs::providers::fake::{FakeCaptioner, FakeEmbedder, FakeReasoner, FakeTranscriber};
use videorag_rs::providers::{AudioChunk, Frame};
use videorag_rs::segment::TranscriptWindow;
use videorag_rs::{
    Config, IngestRequest, RetrievalFilters, RetrievalQuery, VideoRagEngine, VideoRagError,
    VideoStatus, VideoStore,
};

fn test_config(db_path: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.database_path = db_path.to_str().unwrap().to_string();
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

fn engine_with_windows(
    db_path: &std::path::Path,
    windows: Vec<TranscriptWindow>,
) -> (VideoRagEngine, VideoStore) {
    let config = test_config(db_path);
    let store = VideoStore::new(&config.database_path).unwrap();
    let engine = VideoRagEngine::with_providers(
        config,
        store.clone(),
        Arc::new(FakeTranscriber::new(windows)),
        Arc::new(FakeCaptioner),
        Arc::new(FakeEmbedder::default()),
        Arc::new(FakeReasoner::new(
            r#"{"answer": "Budget was approved.", "follow_up_questions": ["By whom?"]}"#,
        )),
    );
    (engine, store)
}

fn request(session_id: &str, video_id: &str, duration: f64) -> IngestRequest {
    IngestRequest {
        session_id: session_id.to_string(),
        video_id: video_id.to_string(),
        duration,
        audio: vec![AudioChunk {
            start: 0.0,
            end: duration,
            data: vec![],
        }],
        frames: vec![Frame {
            ts: 45.0,
            jpeg: vec![],
        }],
    }
}

fn meeting_windows() -> Vec<TranscriptWindow> {
    vec![
        TranscriptWindow {
            start: 0.0,
            end: 60.0,
            text: "welcome everyone to the quarterly review".to_string(),
        },
        TranscriptWindow {
            start: 60.0,
            end: 90.0,
            text: "the budget was approved unanimously".to_string(),
        },
    ]
}

#[tokio::test]
async fn test_ingest_partitions_video_into_contiguous_segments(
) -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let (engine, store) = engine_with_windows(&temp_dir.path().join("rag.db"), meeting_windows());
    let session = engine.create_session()?;

    let video = engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await?;
    assert_eq!(video.status, VideoStatus::Ready);

    let segments = store.get_segments("v1")?;
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].start, 0.0);
    assert_eq!(segments[0].end, 60.0);
    assert_eq!(segments[1].start, 60.0);
    assert_eq!(segments[1].end, 90.0);

    // The 45s key frame's caption lands in the first segment
    assert_eq!(segments[0].captions.len(), 1);
    assert!(segments[1].captions.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_query_returns_ranked_segments() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let (engine, _store) = engine_with_windows(&temp_dir.path().join("rag.db"), meeting_windows());
    let session = engine.create_session()?;
    engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await?;

    let output = engine
        .search(&RetrievalQuery {
            session_id: session.session_id.clone(),
            video_id: None,
            prompt: "budget approved".to_string(),
            top_k: 5,
            filters: RetrievalFilters::default(),
            timeout: None,
        })
        .await?;

    assert!(!output.results.is_empty());
    assert!(output.results[0].evidence.contains("budget"));
    for pair in output.results.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    Ok(())
}

#[tokio::test]
async fn test_queries_never_cross_sessions() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let (engine, _store) = engine_with_windows(&temp_dir.path().join("rag.db"), meeting_windows());

    let session_a = engine.create_session()?;
    let session_b = engine.create_session()?;
    engine
        .ingest_video(&request(&session_a.session_id, "v1", 90.0))
        .await?;

    let output = engine
        .search(&RetrievalQuery {
            session_id: session_b.session_id.clone(),
            video_id: None,
            prompt: "budget approved".to_string(),
            top_k: 5,
            filters: RetrievalFilters::default(),
            timeout: None,
        })
        .await?;
    assert!(output.results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reingest_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let (engine, store) = engine_with_windows(&temp_dir.path().join("rag.db"), meeting_windows());
    let session = engine.create_session()?;

    engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await?;
    let chunks_before = store.count_chunks(&session.session_id)?;
    let ids_before: Vec<_> = store
        .get_segments("v1")?
        .into_iter()
        .map(|s| s.segment_id)
        .collect();

    engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await?;
    let ids_after: Vec<_> = store
        .get_segments("v1")?
        .into_iter()
        .map(|s| s.segment_id)
        .collect();

    assert_eq!(ids_before, ids_after);
    assert_eq!(store.count_chunks(&session.session_id)?, chunks_before);
    Ok(())
}

#[tokio::test]
async fn test_failed_embed_resumes_without_duplicates() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let config = test_config(&temp_dir.path().join("rag.db"));
    let store = VideoStore::new(&config.database_path)?;
    // Three failures exhaust one run's budget, the rerun then succeeds
    let engine = VideoRagEngine::with_providers(
        config,
        store.clone(),
        Arc::new(FakeTranscriber::new(meeting_windows())),
        Arc::new(FakeCaptioner),
        Arc::new(FakeEmbedder::default().fail_first(3)),
        Arc::new(FakeReasoner::new("")),
    );
    let session = engine.create_session()?;

    let err = engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await
        .unwrap_err();
    assert!(matches!(err, VideoRagError::EmbeddingProvider(_)));

    let video = engine.video_status("v1")?.unwrap();
    assert_eq!(video.status, VideoStatus::Failed);
    assert_eq!(video.last_step.as_deref(), Some("segment"));

    let video = engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await?;
    assert_eq!(video.status, VideoStatus::Ready);

    // One embedding set per segment, no duplicates from the failed run
    for segment in store.get_segments("v1")? {
        let ids = store.get_chunk_ids_for_segment(&segment.segment_id)?;
        assert_eq!(ids, segment.chunk_embedding_ids);
        assert!(!ids.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_ask_returns_cited_answer() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let (engine, _store) = engine_with_windows(&temp_dir.path().join("rag.db"), meeting_windows());
    let session = engine.create_session()?;
    engine
        .ingest_video(&request(&session.session_id, "v1", 90.0))
        .await?;

    let answer = engine
        .ask(&session.session_id, Some("v1"), "was the budget approved?", 3)
        .await?;

    assert_eq!(answer.answer, "Budget was approved.");
    assert!(!answer.supporting_segments.is_empty());
    assert_eq!(answer.follow_up_questions, vec!["By whom?"]);
    assert_eq!(answer.metadata.video_id.as_deref(), Some("v1"));
    Ok(())
}
