//! Step-by-step ingestion driver
//!
//! Each step checks the session is still active before starting, advances its
//! checkpoint with a compare-and-swap so two workers never complete the same
//! step twice, and records a failure kind on the video when the retry budget
//! runs out. Committed work is never rolled back.

use crate::config::RetryConfig;
use crate::embedding::pipeline::{backoff_delay, EmbeddingPipeline};
use crate::error::{Result, VideoRagError};
use crate::pipeline::{step_rank, IngestRequest, STEP_EMBED, STEP_EXTRACT, STEP_SEGMENT};
use crate::providers::{SpeechToText, VisionCaptioner};
use crate::segment::{builder::SegmentBuilder, FrameCaption, Segment, TranscriptWindow};
use crate::session::SessionManager;
use crate::storage::{VideoRecord, VideoStatus, VideoStore};
use std::sync::Arc;

/// Orchestrates extract, segment and embed for one video at a time
pub struct JobOrchestrator {
    store: VideoStore,
    sessions: SessionManager,
    builder: SegmentBuilder,
    embedding: EmbeddingPipeline,
    transcriber: Arc<dyn SpeechToText>,
    captioner: Arc<dyn VisionCaptioner>,
    retry: RetryConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: VideoStore,
        sessions: SessionManager,
        builder: SegmentBuilder,
        embedding: EmbeddingPipeline,
        transcriber: Arc<dyn SpeechToText>,
        captioner: Arc<dyn VisionCaptioner>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            builder,
            embedding,
            transcriber,
            captioner,
            retry,
        }
    }

    /// Ingest one video, resuming from its last checkpoint if it already
    /// exists.
    ///
    /// A video that is already `ready` returns immediately. Provider errors
    /// that exhaust the retry budget mark the video `failed` with the error
    /// kind recorded; the checkpoint and any committed segments or chunks
    /// stay in place, so a later call picks up at the failed step. A session
    /// that expires mid-run aborts the job between steps without touching
    /// the checkpoint.
    pub async fn ingest(&self, request: &IngestRequest) -> Result<VideoRecord> {
        self.sessions.require_active(&request.session_id)?;
        let _guard = self.sessions.begin_operation(&request.session_id)?;

        match self.store.get_video(&request.video_id)? {
            Some(video) if video.session_id != request.session_id => {
                return Err(VideoRagError::InvalidInput(format!(
                    "video {} belongs to another session",
                    request.video_id
                )));
            }
            Some(video) if video.status == VideoStatus::Ready => {
                log::info!("Video {} already ready, skipping", request.video_id);
                return Ok(video);
            }
            Some(video) => {
                log::info!(
                    "Resuming video {} from checkpoint {:?}",
                    request.video_id,
                    video.last_step
                );
            }
            None => {
                self.store.upsert_video(&VideoRecord {
                    video_id: request.video_id.clone(),
                    session_id: request.session_id.clone(),
                    duration: request.duration,
                    status: VideoStatus::Pending,
                    failure_kind: None,
                    failure_reason: None,
                    last_step: None,
                })?;
            }
        }
        self.store
            .set_video_status(&request.video_id, VideoStatus::Processing)?;

        match self.run_steps(request).await {
            Ok(()) => {
                self.store
                    .set_video_status(&request.video_id, VideoStatus::Ready)?;
            }
            Err(err @ VideoRagError::SessionExpired(_)) => {
                log::warn!(
                    "Ingestion of {} aborted, session expired",
                    request.video_id
                );
                return Err(err);
            }
            Err(err) => {
                self.store
                    .set_video_failure(&request.video_id, err.kind(), &err.to_string())?;
                return Err(err);
            }
        }

        self.store
            .get_video(&request.video_id)?
            .ok_or_else(|| VideoRagError::Generic(format!("video {} vanished", request.video_id)))
    }

    async fn run_steps(&self, request: &IngestRequest) -> Result<()> {
        let mut last_step = self
            .store
            .get_video(&request.video_id)?
            .and_then(|v| v.last_step);

        let mut segments: Vec<Segment>;
        if step_rank(last_step.as_deref()) >= step_rank(Some(STEP_SEGMENT)) {
            segments = self.store.get_segments(&request.video_id)?;
        } else {
            // Extraction output is not persisted, so a checkpoint before
            // `segment` always restarts from extract.
            self.sessions.require_active(&request.session_id)?;
            let (windows, captions) = self.extract(request).await?;
            self.advance(&request.video_id, &mut last_step, STEP_EXTRACT)?;

            self.sessions.require_active(&request.session_id)?;
            segments =
                self.builder
                    .build(&request.video_id, request.duration, &windows, &captions)?;
            // A re-extraction can shift window edges and mint new segment ids;
            // clear rows from any earlier uncheckpointed attempt so the stored
            // partition stays non-overlapping.
            self.store.delete_by_video(&request.video_id)?;
            self.store.upsert_segments(&request.session_id, &segments)?;
            self.advance(&request.video_id, &mut last_step, STEP_SEGMENT)?;
        }

        if step_rank(last_step.as_deref()) < step_rank(Some(STEP_EMBED)) {
            self.sessions.require_active(&request.session_id)?;
            let written = self
                .embedding
                .embed_segments(&request.session_id, &request.video_id, &mut segments)
                .await?;
            log::info!("Embedded {} chunks for video {}", written, request.video_id);
            self.advance(&request.video_id, &mut last_step, STEP_EMBED)?;
        }

        Ok(())
    }

    /// Advance the checkpoint with a compare-and-swap on the stored step.
    fn advance(
        &self,
        video_id: &str,
        last_step: &mut Option<String>,
        to: &'static str,
    ) -> Result<()> {
        if self
            .store
            .cas_video_step(video_id, last_step.as_deref(), to)?
        {
            *last_step = Some(to.to_string());
            return Ok(());
        }

        // Lost the race: another worker moved the checkpoint. Accept it if
        // it is at least as far along as ours.
        let stored = self
            .store
            .get_video(video_id)?
            .and_then(|v| v.last_step);
        if step_rank(stored.as_deref()) >= step_rank(Some(to)) {
            log::warn!(
                "Checkpoint {} for video {} completed by another worker",
                to,
                video_id
            );
            *last_step = stored;
            Ok(())
        } else {
            Err(VideoRagError::Generic(format!(
                "checkpoint conflict on video {}: expected {:?}, found {:?}",
                video_id, last_step, stored
            )))
        }
    }

    async fn extract(
        &self,
        request: &IngestRequest,
    ) -> Result<(Vec<TranscriptWindow>, Vec<FrameCaption>)> {
        let mut windows = Vec::new();
        for chunk in &request.audio {
            let mut attempt = 0;
            let transcribed = loop {
                attempt += 1;
                match self.transcriber.transcribe(chunk).await {
                    Ok(w) => break w,
                    Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                        log::warn!(
                            "Transcription attempt {} for [{:.1}s, {:.1}s) failed: {}",
                            attempt,
                            chunk.start,
                            chunk.end,
                            e
                        );
                        tokio::time::sleep(backoff_delay(&self.retry, attempt)).await;
                    }
                    Err(e) => return Err(e),
                }
            };
            windows.extend(transcribed);
        }

        let mut captions = Vec::new();
        for frame in &request.frames {
            let mut attempt = 0;
            let caption = loop {
                attempt += 1;
                match self.captioner.describe(frame).await {
                    Ok(c) => break c,
                    Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                        log::warn!(
                            "Caption attempt {} for frame {:.1}s failed: {}",
                            attempt,
                            frame.ts,
                            e
                        );
                        tokio::time::sleep(backoff_delay(&self.retry, attempt)).await;
                    }
                    Err(e) => return Err(e),
                }
            };
            captions.push(caption);
        }

        windows.sort_by(|a, b| a.start.total_cmp(&b.start));
        captions.sort_by(|a, b| a.frame_ts.total_cmp(&b.frame_ts));
        Ok((windows, captions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, EmbeddingConfig, SegmentationConfig, SessionConfig};
    use crate::providers::fake::{FakeCaptioner, FakeEmbedder, FakeTranscriber};
    use crate::providers::{AudioChunk, Frame, TextEmbedder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTranscriber {
        inner: FakeTranscriber,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SpeechToText for CountingTranscriber {
        async fn transcribe(&self, chunk: &AudioChunk) -> Result<Vec<TranscriptWindow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.transcribe(chunk).await
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    fn request(session_id: &str) -> IngestRequest {
        IngestRequest {
            session_id: session_id.to_string(),
            video_id: "vid-1".to_string(),
            duration: 60.0,
            audio: vec![AudioChunk {
                start: 0.0,
                end: 60.0,
                data: vec![],
            }],
            frames: vec![Frame {
                ts: 15.0,
                jpeg: vec![],
            }],
        }
    }

    fn windows() -> Vec<TranscriptWindow> {
        vec![
            TranscriptWindow {
                start: 0.0,
                end: 30.0,
                text: "intro and agenda".to_string(),
            },
            TranscriptWindow {
                start: 30.0,
                end: 60.0,
                text: "budget review".to_string(),
            },
        ]
    }

    struct Harness {
        store: VideoStore,
        sessions: SessionManager,
        embedder: Arc<FakeEmbedder>,
        transcriber: Arc<CountingTranscriber>,
        session_id: String,
    }

    fn harness(embedder: FakeEmbedder) -> Harness {
        let store = VideoStore::in_memory().unwrap();
        let sessions = SessionManager::new(store.clone(), SessionConfig::default());
        let embedder = Arc::new(embedder);
        let transcriber = Arc::new(CountingTranscriber {
            inner: FakeTranscriber::new(windows()),
            calls: AtomicUsize::new(0),
        });
        let session = sessions.create_session(embedder.model()).unwrap();
        Harness {
            store,
            sessions,
            embedder,
            transcriber,
            session_id: session.session_id,
        }
    }

    fn orchestrator(h: &Harness) -> JobOrchestrator {
        let pipeline = EmbeddingPipeline::new(
            ChunkingConfig::default(),
            EmbeddingConfig::default(),
            fast_retry(),
            h.embedder.clone(),
            h.store.clone(),
        );
        JobOrchestrator::new(
            h.store.clone(),
            h.sessions.clone(),
            SegmentBuilder::new(SegmentationConfig::default()),
            pipeline,
            h.transcriber.clone(),
            Arc::new(FakeCaptioner),
            fast_retry(),
        )
    }

    #[tokio::test]
    async fn test_successful_ingest_reaches_ready() {
        let h = harness(FakeEmbedder::default());
        let orch = orchestrator(&h);

        let video = orch.ingest(&request(&h.session_id)).await.unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.last_step.as_deref(), Some(STEP_EMBED));
        assert_eq!(h.store.get_segments("vid-1").unwrap().len(), 2);
        assert!(h.store.count_chunks(&h.session_id).unwrap() > 0);
    }

    #[tokio::test]
    async fn test_embed_failure_records_kind_and_resumes_at_embed() {
        // Enough injected failures to exhaust the 3-attempt budget once,
        // then succeed on the rerun.
        let h = harness(FakeEmbedder::default().fail_first(3));
        let orch = orchestrator(&h);

        let err = orch.ingest(&request(&h.session_id)).await.unwrap_err();
        assert!(matches!(err, VideoRagError::EmbeddingProvider(_)));

        let video = h.store.get_video("vid-1").unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert_eq!(video.failure_kind.as_deref(), Some("embedding_provider"));
        assert_eq!(video.last_step.as_deref(), Some(STEP_SEGMENT));
        let extract_calls = h.transcriber.calls.load(Ordering::SeqCst);

        let video = orch.ingest(&request(&h.session_id)).await.unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        // Resume skipped extraction entirely
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), extract_calls);

        // Exactly one embedding set per segment
        for segment in h.store.get_segments("vid-1").unwrap() {
            let ids = h.store.get_chunk_ids_for_segment(&segment.segment_id).unwrap();
            assert_eq!(ids, segment.chunk_embedding_ids);
            assert!(!ids.is_empty());
        }
    }

    #[tokio::test]
    async fn test_reextraction_with_shifted_windows_keeps_partition() {
        let h = harness(FakeEmbedder::default());
        let orch = orchestrator(&h);
        orch.ingest(&request(&h.session_id)).await.unwrap();

        // Rewind the checkpoint to before segmentation, as if the worker died
        // after persisting segments but before advancing the step.
        assert!(h
            .store
            .cas_video_step("vid-1", Some(STEP_EMBED), STEP_EXTRACT)
            .unwrap());
        h.store
            .set_video_status("vid-1", VideoStatus::Processing)
            .unwrap();

        // Re-ingest with slightly shifted window edges, as a live transcriber
        // would produce.
        let shifted = Arc::new(CountingTranscriber {
            inner: FakeTranscriber::new(vec![
                TranscriptWindow {
                    start: 0.0,
                    end: 28.0,
                    text: "intro and agenda".to_string(),
                },
                TranscriptWindow {
                    start: 28.0,
                    end: 60.0,
                    text: "budget review".to_string(),
                },
            ]),
            calls: AtomicUsize::new(0),
        });
        let pipeline = EmbeddingPipeline::new(
            ChunkingConfig::default(),
            EmbeddingConfig::default(),
            fast_retry(),
            h.embedder.clone(),
            h.store.clone(),
        );
        let orch = JobOrchestrator::new(
            h.store.clone(),
            h.sessions.clone(),
            SegmentBuilder::new(SegmentationConfig::default()),
            pipeline,
            shifted,
            Arc::new(FakeCaptioner),
            fast_retry(),
        );
        orch.ingest(&request(&h.session_id)).await.unwrap();

        // The first run's rows are gone; the stored segments are still a
        // gapless, non-overlapping partition of the duration.
        let segments = h.store.get_segments("vid-1").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, 28.0);
        assert_eq!(segments.last().unwrap().end, 60.0);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[tokio::test]
    async fn test_ready_video_short_circuits() {
        let h = harness(FakeEmbedder::default());
        let orch = orchestrator(&h);

        orch.ingest(&request(&h.session_id)).await.unwrap();
        let chunks_before = h.store.count_chunks(&h.session_id).unwrap();
        let extract_calls = h.transcriber.calls.load(Ordering::SeqCst);

        let video = orch.ingest(&request(&h.session_id)).await.unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), extract_calls);
        assert_eq!(h.store.count_chunks(&h.session_id).unwrap(), chunks_before);
    }

    #[tokio::test]
    async fn test_expired_session_rejected_before_work() {
        let h = harness(FakeEmbedder::default());
        let orch = orchestrator(&h);

        h.sessions.close_session(&h.session_id).unwrap();
        let err = orch.ingest(&request(&h.session_id)).await.unwrap_err();
        assert!(matches!(err, VideoRagError::SessionExpired(_)));
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_ingestion_marks_video_failed() {
        let h = harness(FakeEmbedder::default());
        let orch = orchestrator(&h);

        let mut req = request(&h.session_id);
        req.audio = vec![AudioChunk {
            start: 100.0,
            end: 101.0,
            data: vec![],
        }];
        req.frames = vec![];

        let err = orch.ingest(&req).await.unwrap_err();
        assert!(matches!(err, VideoRagError::EmptyIngestion(_)));
        let video = h.store.get_video("vid-1").unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert_eq!(video.failure_kind.as_deref(), Some("empty_ingestion"));
    }

    #[tokio::test]
    async fn test_video_cannot_move_between_sessions() {
        let h = harness(FakeEmbedder::default());
        let orch = orchestrator(&h);
        orch.ingest(&request(&h.session_id)).await.unwrap();

        let other = h.sessions.create_session(h.embedder.model()).unwrap();
        let err = orch
            .ingest(&request(&other.session_id))
            .await
            .unwrap_err();
        assert!(matches!(err, VideoRagError::InvalidInput(_)));
    }
}
