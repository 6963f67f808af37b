//! Hybrid semantic + lexical retrieval
//!
//! Embeds the prompt with the session-pinned model, overfetches nearest
//! neighbors from the store, applies metadata filters as a post-filter, fuses
//! vector and lexical scores, deduplicates chunks per segment and returns the
//! best `top_k` segments. Queries run under an operation guard so session
//! purging drains cleanly, and under a caller-specified timeout.

use crate::config::RetrievalConfig;
use crate::error::{Result, VideoRagError};
use crate::providers::TextEmbedder;
use crate::retrieval::fusion::{fuse_scores, lexical_overlap, normalize_similarity};
use crate::retrieval::{RetrievalFilters, RetrievalOutput, RetrievalQuery, RetrievalResult};
use crate::session::SessionManager;
use crate::storage::{ChunkHit, VideoStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Session-scoped hybrid retriever
pub struct HybridRetriever {
    store: VideoStore,
    sessions: SessionManager,
    embedder: Arc<dyn TextEmbedder>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// Create a retriever over the given store, session manager and embedder
    pub fn new(
        store: VideoStore,
        sessions: SessionManager,
        embedder: Arc<dyn TextEmbedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            embedder,
            config,
        }
    }

    /// Run one retrieval query, best results first.
    ///
    /// Returns an empty result list (not an error) when nothing passes the
    /// filters. Expired sessions fail with `SessionExpired`; a query that
    /// exceeds its timeout fails with `QueryTimeout` rather than returning
    /// partial results.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievalOutput> {
        let session = self.sessions.require_active(&query.session_id)?;
        if session.embedding_model != self.embedder.model() {
            return Err(VideoRagError::Config(format!(
                "session {} is pinned to embedding model {} but retriever uses {}",
                query.session_id,
                session.embedding_model,
                self.embedder.model()
            )));
        }
        let _guard = self.sessions.begin_operation(&query.session_id)?;

        let timeout = query.timeout.unwrap_or(self.config.timeout_duration());
        match tokio::time::timeout(timeout, self.retrieve_inner(query)).await {
            Ok(result) => result,
            Err(_) => Err(VideoRagError::QueryTimeout(timeout.as_millis() as u64)),
        }
    }

    async fn retrieve_inner(&self, query: &RetrievalQuery) -> Result<RetrievalOutput> {
        if query.top_k == 0 {
            return Ok(RetrievalOutput {
                query: query.prompt.clone(),
                results: Vec::new(),
            });
        }

        let prompt_vector = self
            .embedder
            .embed(std::slice::from_ref(&query.prompt))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VideoRagError::Generic("embedder returned no vector".to_string()))?;

        let overfetch = query.top_k.saturating_mul(self.config.overfetch_factor).max(query.top_k);
        let hits = self.store.query_chunks(
            &query.session_id,
            query.video_id.as_deref(),
            &prompt_vector,
            overfetch,
        )?;

        let mut best_per_segment: HashMap<String, RetrievalResult> = HashMap::new();
        for hit in hits {
            if !self.passes_filters(&hit, &query.filters)? {
                continue;
            }

            let vector_score = normalize_similarity(hit.similarity);
            let lexical_score = lexical_overlap(&query.prompt, &hit.text);
            let confidence = fuse_scores(
                vector_score,
                lexical_score,
                self.config.vector_weight,
                self.config.lexical_weight,
            );

            let candidate = RetrievalResult {
                segment_id: hit.segment_id.clone(),
                start: hit.start,
                end: hit.end,
                confidence,
                evidence: hit.text,
            };

            // Multiple chunks of one segment collapse to the best-scoring one
            match best_per_segment.get(&hit.segment_id) {
                Some(existing) if existing.confidence >= confidence => {}
                _ => {
                    best_per_segment.insert(hit.segment_id, candidate);
                }
            }
        }

        let mut results: Vec<RetrievalResult> = best_per_segment.into_values().collect();
        results.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.start.total_cmp(&b.start))
        });
        results.truncate(query.top_k);

        log::info!(
            "Query '{}' in session {}: {} results",
            query.prompt,
            query.session_id,
            results.len()
        );
        Ok(RetrievalOutput {
            query: query.prompt.clone(),
            results,
        })
    }

    /// Metadata post-filter: time range and caption-derived tags.
    fn passes_filters(&self, hit: &ChunkHit, filters: &RetrievalFilters) -> Result<bool> {
        if let Some((lo, hi)) = filters.time_range {
            // Segment must overlap the requested range
            if hit.end <= lo || hit.start >= hi {
                return Ok(false);
            }
        }

        if !filters.tags.is_empty() {
            let segment = match self.store.get_segment(&hit.segment_id)? {
                Some(s) => s,
                None => return Ok(false),
            };
            let haystack = segment
                .captions
                .iter()
                .flat_map(|c| {
                    c.objects
                        .iter()
                        .cloned()
                        .chain(std::iter::once(c.description.clone()))
                })
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            let matched = filters
                .tags
                .iter()
                .any(|tag| haystack.contains(&tag.to_lowercase()));
            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::providers::fake::FakeEmbedder;
    use crate::segment::{FrameCaption, Segment};
    use crate::embedding::EmbeddingChunk;
    use std::time::Duration;

    struct Fixture {
        store: VideoStore,
        sessions: SessionManager,
        embedder: Arc<FakeEmbedder>,
        session_id: String,
    }

    fn fixture() -> Fixture {
        let store = VideoStore::in_memory().unwrap();
        let sessions = SessionManager::new(store.clone(), SessionConfig::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let session = sessions.create_session(embedder.model()).unwrap();
        Fixture {
            store,
            sessions,
            embedder,
            session_id: session.session_id,
        }
    }

    fn retriever(f: &Fixture) -> HybridRetriever {
        HybridRetriever::new(
            f.store.clone(),
            f.sessions.clone(),
            f.embedder.clone(),
            RetrievalConfig::default(),
        )
    }

    fn ingest_segment(f: &Fixture, video_id: &str, start: f64, end: f64, text: &str, tags: Vec<&str>) {
        let captions = if tags.is_empty() {
            vec![]
        } else {
            vec![FrameCaption {
                frame_ts: start,
                description: String::new(),
                objects: tags.into_iter().map(String::from).collect(),
                text: String::new(),
            }]
        };
        let segment = Segment {
            segment_id: Segment::make_id(video_id, start, end),
            video_id: video_id.to_string(),
            start,
            end,
            transcript: text.to_string(),
            captions,
            chunk_embedding_ids: vec![],
        };
        f.store.upsert_segments(&f.session_id, &[segment.clone()]).unwrap();
        let chunk = EmbeddingChunk {
            chunk_id: EmbeddingChunk::make_id(&segment.segment_id, 0, text),
            segment_id: segment.segment_id.clone(),
            chunk_index: 0,
            text: text.to_string(),
            vector: f.embedder.embed_one(text),
            token_count: text.split_whitespace().count(),
        };
        f.store.upsert_chunks(&f.session_id, video_id, &[chunk]).unwrap();
    }

    fn query(f: &Fixture, prompt: &str, top_k: usize) -> RetrievalQuery {
        RetrievalQuery {
            session_id: f.session_id.clone(),
            video_id: None,
            prompt: prompt.to_string(),
            top_k,
            filters: RetrievalFilters::default(),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_best_match_first() {
        let f = fixture();
        ingest_segment(&f, "v1", 0.0, 30.0, "the quarterly revenue numbers looked strong", vec![]);
        ingest_segment(&f, "v1", 30.0, 60.0, "a cooking demonstration with fresh pasta", vec![]);

        let r = retriever(&f);
        let output = r.retrieve(&query(&f, "quarterly revenue", 2)).await.unwrap();
        assert_eq!(output.results.len(), 2);
        assert!(output.results[0].evidence.contains("revenue"));
        assert!(output.results[0].confidence >= output.results[1].confidence);
    }

    #[tokio::test]
    async fn test_results_ordered_ties_by_start() {
        let f = fixture();
        // Identical text in two segments forces a confidence tie
        ingest_segment(&f, "v1", 30.0, 60.0, "identical text here", vec![]);
        ingest_segment(&f, "v1", 0.0, 30.0, "identical text here", vec![]);

        let r = retriever(&f);
        let output = r.retrieve(&query(&f, "identical text", 5)).await.unwrap();
        assert_eq!(output.results.len(), 2);
        assert_eq!(output.results[0].start, 0.0);
        assert_eq!(output.results[1].start, 30.0);
    }

    #[tokio::test]
    async fn test_dedupe_by_segment() {
        let f = fixture();
        let segment = Segment {
            segment_id: Segment::make_id("v1", 0.0, 30.0),
            video_id: "v1".to_string(),
            start: 0.0,
            end: 30.0,
            transcript: String::new(),
            captions: vec![],
            chunk_embedding_ids: vec![],
        };
        f.store.upsert_segments(&f.session_id, &[segment.clone()]).unwrap();
        for (i, text) in ["budget discussion part one", "budget discussion part two"]
            .iter()
            .enumerate()
        {
            let chunk = EmbeddingChunk {
                chunk_id: EmbeddingChunk::make_id(&segment.segment_id, i, text),
                segment_id: segment.segment_id.clone(),
                chunk_index: i,
                text: text.to_string(),
                vector: f.embedder.embed_one(text),
                token_count: 4,
            };
            f.store.upsert_chunks(&f.session_id, "v1", &[chunk]).unwrap();
        }

        let r = retriever(&f);
        let output = r.retrieve(&query(&f, "budget discussion", 5)).await.unwrap();
        assert_eq!(output.results.len(), 1);
    }

    #[tokio::test]
    async fn test_time_range_filter() {
        let f = fixture();
        ingest_segment(&f, "v1", 0.0, 30.0, "early content about planning", vec![]);
        ingest_segment(&f, "v1", 60.0, 90.0, "late content about planning", vec![]);

        let r = retriever(&f);
        let mut q = query(&f, "planning", 5);
        q.filters.time_range = Some((45.0, 100.0));
        let output = r.retrieve(&q).await.unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].start, 60.0);
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let f = fixture();
        ingest_segment(&f, "v1", 0.0, 30.0, "two people talking", vec!["whiteboard"]);
        ingest_segment(&f, "v1", 30.0, 60.0, "two people talking", vec!["car"]);

        let r = retriever(&f);
        let mut q = query(&f, "people talking", 5);
        q.filters.tags = vec!["whiteboard".to_string()];
        let output = r.retrieve(&q).await.unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].start, 0.0);
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_not_error() {
        let f = fixture();
        let r = retriever(&f);
        let output = r.retrieve(&query(&f, "anything at all", 5)).await.unwrap();
        assert!(output.results.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_returns_session_expired() {
        let f = fixture();
        ingest_segment(&f, "v1", 0.0, 30.0, "some content", vec![]);
        f.sessions.close_session(&f.session_id).unwrap();

        let r = retriever(&f);
        let err = r.retrieve(&query(&f, "some content", 5)).await.unwrap_err();
        assert!(matches!(err, VideoRagError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let f = fixture();
        let sessions = f.sessions.clone();
        let other_session = {
            // Session pinned to a different model than the retriever's embedder
            let s = sessions.create_session("some-other-model").unwrap();
            s.session_id
        };

        let r = retriever(&f);
        let mut q = query(&f, "prompt", 5);
        q.session_id = other_session;
        let err = r.retrieve(&q).await.unwrap_err();
        assert!(matches!(err, VideoRagError::Config(_)));
    }

    #[tokio::test]
    async fn test_video_scoped_query() {
        let f = fixture();
        ingest_segment(&f, "v1", 0.0, 30.0, "shared topic discussed", vec![]);
        ingest_segment(&f, "v2", 0.0, 30.0, "shared topic discussed", vec![]);

        let r = retriever(&f);
        let mut q = query(&f, "shared topic", 5);
        q.video_id = Some("v2".to_string());
        let output = r.retrieve(&q).await.unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(
            output.results[0].segment_id,
            Segment::make_id("v2", 0.0, 30.0)
        );
    }

    struct SlowEmbedder {
        inner: FakeEmbedder,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl TextEmbedder for SlowEmbedder {
        async fn embed(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            tokio::time::sleep(self.delay).await;
            self.inner.embed(texts).await
        }

        fn model(&self) -> &str {
            self.inner.model()
        }
    }

    #[tokio::test]
    async fn test_timeout_returns_typed_error() {
        let f = fixture();
        ingest_segment(&f, "v1", 0.0, 30.0, "content", vec![]);

        let slow = Arc::new(SlowEmbedder {
            inner: FakeEmbedder::default(),
            delay: Duration::from_millis(200),
        });
        let r = HybridRetriever::new(
            f.store.clone(),
            f.sessions.clone(),
            slow,
            RetrievalConfig::default(),
        );

        let mut q = query(&f, "content", 5);
        q.timeout = Some(Duration::from_millis(5));
        let err = r.retrieve(&q).await.unwrap_err();
        assert!(matches!(err, VideoRagError::QueryTimeout(_)));
    }
}
