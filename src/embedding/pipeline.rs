//! Batched, retryable embedding of segment chunks
//!
//! Chunks are grouped into provider-sized batches and embedded concurrently,
//! bounded by a semaphore so provider rate limits are respected. Transient
//! failures back off exponentially with jitter; once the attempt budget is
//! spent the error surfaces as `EmbeddingProvider` and the video fails,
//! leaving already-written chunks intact for a later retry.

use crate::config::{ChunkingConfig, EmbeddingConfig, RetryConfig};
use crate::embedding::{EmbeddingChunk, SegmentChunker};
use crate::error::{Result, VideoRagError};
use crate::providers::TextEmbedder;
use crate::segment::Segment;
use crate::storage::VideoStore;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Embeds segment text and persists the resulting chunks
pub struct EmbeddingPipeline {
    chunker: SegmentChunker,
    embedder: Arc<dyn TextEmbedder>,
    store: VideoStore,
    embedding: EmbeddingConfig,
    retry: RetryConfig,
}

impl EmbeddingPipeline {
    /// Create a pipeline over the given provider and store
    pub fn new(
        chunking: ChunkingConfig,
        embedding: EmbeddingConfig,
        retry: RetryConfig,
        embedder: Arc<dyn TextEmbedder>,
        store: VideoStore,
    ) -> Self {
        Self {
            chunker: SegmentChunker::new(chunking),
            embedder,
            store,
            embedding,
            retry,
        }
    }

    /// Chunk, embed and upsert all segments of one video.
    ///
    /// Idempotent: chunk ids are content hashes, so a rerun on unchanged
    /// segment text overwrites the same rows. Returns the number of chunks
    /// written. Segments are re-upserted with their `chunk_embedding_ids`
    /// filled in once every chunk is stored.
    pub async fn embed_segments(
        &self,
        session_id: &str,
        video_id: &str,
        segments: &mut [Segment],
    ) -> Result<usize> {
        let mut all_chunks: Vec<EmbeddingChunk> = Vec::new();
        for segment in segments.iter_mut() {
            let chunks = self.chunker.chunk_segment(segment);
            segment.chunk_embedding_ids = chunks.iter().map(|c| c.chunk_id.clone()).collect();
            all_chunks.extend(chunks);
        }

        if all_chunks.is_empty() {
            log::warn!("Video {} produced no embeddable text", video_id);
            self.store.upsert_segments(session_id, segments)?;
            return Ok(0);
        }

        let batch_size = self.embedding.batch_size.min(self.embedder.max_batch_size());
        let semaphore = Arc::new(Semaphore::new(self.embedding.parallelism.max(1)));

        let mut tasks = Vec::new();
        for batch in all_chunks.chunks(batch_size) {
            let batch: Vec<EmbeddingChunk> = batch.to_vec();
            let embedder = Arc::clone(&self.embedder);
            let store = self.store.clone();
            let retry = self.retry.clone();
            let semaphore = Arc::clone(&semaphore);
            let session_id = session_id.to_string();
            let video_id = video_id.to_string();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| VideoRagError::Generic("semaphore closed".to_string()))?;

                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = embed_with_retry(embedder.as_ref(), &texts, &retry).await?;

                let mut embedded = batch;
                for (chunk, vector) in embedded.iter_mut().zip(vectors) {
                    chunk.vector = vector;
                }
                store.upsert_chunks(&session_id, &video_id, &embedded)?;
                Ok::<usize, VideoRagError>(embedded.len())
            }));
        }

        let mut written = 0;
        for result in futures::future::join_all(tasks).await {
            written += result
                .map_err(|e| VideoRagError::Generic(format!("embedding task panicked: {}", e)))??;
        }

        self.store.upsert_segments(session_id, segments)?;
        log::info!(
            "Embedded {} chunks across {} segments for video {}",
            written,
            segments.len(),
            video_id
        );
        Ok(written)
    }
}

/// Embed one batch, retrying transient failures with exponential backoff.
///
/// An exhausted budget maps to `EmbeddingProvider` so the orchestrator marks
/// the video failed rather than retrying the whole step again.
pub(crate) async fn embed_with_retry(
    embedder: &dyn TextEmbedder,
    texts: &[String],
    retry: &RetryConfig,
) -> Result<Vec<Vec<f32>>> {
    let mut attempt = 0usize;
    loop {
        match embedder.embed(texts).await {
            Ok(vectors) => return Ok(vectors),
            Err(err) if err.is_retryable() => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(VideoRagError::EmbeddingProvider(format!(
                        "retry budget exhausted after {} attempts: {}",
                        attempt, err
                    )));
                }
                let delay = backoff_delay(retry, attempt);
                log::warn!(
                    "Embedding batch failed (attempt {}), retrying in {:?}: {}",
                    attempt,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Exponential backoff with jitter, capped at the configured maximum.
pub(crate) fn backoff_delay(retry: &RetryConfig, attempt: usize) -> Duration {
    let exp = retry
        .base_delay_ms
        .saturating_mul(1u64 << (attempt.min(16) as u32 - 1))
        .min(retry.max_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=exp / 2);
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake::FakeEmbedder;
    use crate::session::{Session, SessionState};

    fn test_store(session_id: &str) -> VideoStore {
        let store = VideoStore::in_memory().unwrap();
        store
            .insert_session(&Session {
                session_id: session_id.to_string(),
                state: SessionState::Active,
                created_at: 0,
                expires_at: i64::MAX,
                embedding_model: "fake-embedding-v1".to_string(),
            })
            .unwrap();
        store
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    fn pipeline_with(embedder: Arc<dyn TextEmbedder>, store: VideoStore) -> EmbeddingPipeline {
        EmbeddingPipeline::new(
            ChunkingConfig::default(),
            EmbeddingConfig::default(),
            fast_retry(),
            embedder,
            store,
        )
    }

    fn sample_segments() -> Vec<Segment> {
        vec![
            Segment {
                segment_id: Segment::make_id("v1", 0.0, 30.0),
                video_id: "v1".to_string(),
                start: 0.0,
                end: 30.0,
                transcript: "the introduction covers project goals".to_string(),
                captions: vec![],
                chunk_embedding_ids: vec![],
            },
            Segment {
                segment_id: Segment::make_id("v1", 30.0, 60.0),
                video_id: "v1".to_string(),
                start: 30.0,
                end: 60.0,
                transcript: "a demo of the search feature".to_string(),
                captions: vec![],
                chunk_embedding_ids: vec![],
            },
        ]
    }

    #[tokio::test]
    async fn test_embed_segments_writes_chunks() {
        let store = test_store("s1");
        let pipeline = pipeline_with(Arc::new(FakeEmbedder::default()), store.clone());
        let mut segments = sample_segments();

        let written = pipeline.embed_segments("s1", "v1", &mut segments).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count_chunks("s1").unwrap(), 2);
        assert!(segments.iter().all(|s| !s.chunk_embedding_ids.is_empty()));
    }

    #[tokio::test]
    async fn test_rerun_creates_no_new_chunks() {
        let store = test_store("s1");
        let pipeline = pipeline_with(Arc::new(FakeEmbedder::default()), store.clone());

        let mut segments = sample_segments();
        pipeline.embed_segments("s1", "v1", &mut segments).await.unwrap();
        let first_ids: Vec<Vec<String>> =
            segments.iter().map(|s| s.chunk_embedding_ids.clone()).collect();

        let mut again = sample_segments();
        pipeline.embed_segments("s1", "v1", &mut again).await.unwrap();
        let second_ids: Vec<Vec<String>> =
            again.iter().map(|s| s.chunk_embedding_ids.clone()).collect();

        assert_eq!(first_ids, second_ids);
        assert_eq!(store.count_chunks("s1").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = test_store("s1");
        let embedder = Arc::new(FakeEmbedder::default().fail_first(1));
        let pipeline = pipeline_with(embedder, store.clone());

        let mut segments = sample_segments();
        let written = pipeline.embed_segments("s1", "v1", &mut segments).await.unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_embedding_provider_error() {
        let store = test_store("s1");
        let embedder = Arc::new(FakeEmbedder::default().fail_first(100));
        let pipeline = pipeline_with(embedder, store);

        let mut segments = sample_segments();
        let err = pipeline.embed_segments("s1", "v1", &mut segments).await.unwrap_err();
        assert!(matches!(err, VideoRagError::EmbeddingProvider(_)));
    }

    #[tokio::test]
    async fn test_textless_video_writes_nothing() {
        let store = test_store("s1");
        let pipeline = pipeline_with(Arc::new(FakeEmbedder::default()), store.clone());

        let mut segments = vec![Segment {
            segment_id: Segment::make_id("v1", 0.0, 30.0),
            video_id: "v1".to_string(),
            start: 0.0,
            end: 30.0,
            transcript: String::new(),
            captions: vec![],
            chunk_embedding_ids: vec![],
        }];
        let written = pipeline.embed_segments("s1", "v1", &mut segments).await.unwrap();
        assert_eq!(written, 0);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };
        let first = backoff_delay(&retry, 1);
        let fifth = backoff_delay(&retry, 5);
        assert!(first.as_millis() >= 100);
        // 100 * 2^4 = 1600, capped at 1000 plus at most half jitter
        assert!(fifth.as_millis() <= 1500);
    }
}
