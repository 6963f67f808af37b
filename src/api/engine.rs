//! High-level engine facade
//!
//! Wires storage, session lifecycle, the ingestion orchestrator, the hybrid
//! retriever and answer assembly into one handle. This is the surface the CLI
//! and library consumers use.

use crate::api::answer::{Answer, AnswerGenerator};
use crate::config::Config;
use crate::embedding::EmbeddingPipeline;
use crate::error::Result;
use crate::pipeline::{IngestRequest, JobOrchestrator};
use crate::providers::{
    OpenAiCaptioner, OpenAiEmbedder, OpenAiReasoner, OpenAiTranscriber, Reasoner, SpeechToText,
    TextEmbedder, VisionCaptioner,
};
use crate::retrieval::{HybridRetriever, RetrievalFilters, RetrievalOutput, RetrievalQuery};
use crate::segment::SegmentBuilder;
use crate::session::{Session, SessionManager};
use crate::storage::{VideoRecord, VideoStore};
use std::sync::Arc;

/// One-stop handle over ingestion, retrieval and session lifecycle
pub struct VideoRagEngine {
    sessions: SessionManager,
    store: VideoStore,
    orchestrator: JobOrchestrator,
    retriever: HybridRetriever,
    answers: AnswerGenerator,
    embedding_model: String,
}

impl VideoRagEngine {
    /// Build an engine with OpenAI-backed providers from the given config.
    pub fn new(config: Config) -> Result<Self> {
        let store = VideoStore::new(&config.database_path)?;
        let transcriber: Arc<dyn SpeechToText> = Arc::new(OpenAiTranscriber::new(&config.provider));
        let captioner: Arc<dyn VisionCaptioner> = Arc::new(OpenAiCaptioner::new(&config.provider));
        let embedder: Arc<dyn TextEmbedder> = Arc::new(OpenAiEmbedder::new(
            &config.provider,
            &config.embedding.model,
            config.embedding.batch_size,
        ));
        let reasoner: Arc<dyn Reasoner> = Arc::new(OpenAiReasoner::new(&config.provider));
        Ok(Self::with_providers(
            config, store, transcriber, captioner, embedder, reasoner,
        ))
    }

    /// Build an engine with caller-supplied providers. Tests inject
    /// deterministic fakes through this.
    pub fn with_providers(
        config: Config,
        store: VideoStore,
        transcriber: Arc<dyn SpeechToText>,
        captioner: Arc<dyn VisionCaptioner>,
        embedder: Arc<dyn TextEmbedder>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Self {
        let sessions = SessionManager::new(store.clone(), config.session.clone());
        let embedding_model = embedder.model().to_string();
        let pipeline = EmbeddingPipeline::new(
            config.chunking.clone(),
            config.embedding.clone(),
            config.retry.clone(),
            Arc::clone(&embedder),
            store.clone(),
        );
        let orchestrator = JobOrchestrator::new(
            store.clone(),
            sessions.clone(),
            SegmentBuilder::new(config.segmentation.clone()),
            pipeline,
            transcriber,
            captioner,
            config.retry.clone(),
        );
        let retriever = HybridRetriever::new(
            store.clone(),
            sessions.clone(),
            embedder,
            config.retrieval.clone(),
        );
        Self {
            sessions,
            store,
            orchestrator,
            retriever,
            answers: AnswerGenerator::new(reasoner),
            embedding_model,
        }
    }

    /// Open a new session pinned to the engine's embedding model.
    pub fn create_session(&self) -> Result<Session> {
        self.sessions.create_session(&self.embedding_model)
    }

    /// Close a session: stop accepting work, purge its data once drained.
    pub fn close_session(&self, session_id: &str) -> Result<()> {
        self.sessions.close_session(session_id)
    }

    /// Run one TTL sweep; returns how many sessions were purged.
    pub fn sweep_sessions(&self) -> Result<usize> {
        self.sessions.sweep()
    }

    /// Start the periodic TTL sweeper in the background.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.sessions.spawn_sweeper()
    }

    /// Ingest one video into its session, resuming from any checkpoint.
    pub async fn ingest_video(&self, request: &IngestRequest) -> Result<VideoRecord> {
        self.orchestrator.ingest(request).await
    }

    /// Current processing state of a video, if known.
    pub fn video_status(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        self.store.get_video(video_id)
    }

    /// Run one retrieval query.
    pub async fn search(&self, query: &RetrievalQuery) -> Result<RetrievalOutput> {
        self.retriever.retrieve(query).await
    }

    /// Retrieve and assemble a cited answer for a question.
    pub async fn ask(
        &self,
        session_id: &str,
        video_id: Option<&str>,
        question: &str,
        top_k: usize,
    ) -> Result<Answer> {
        let query = RetrievalQuery {
            session_id: session_id.to_string(),
            video_id: video_id.map(String::from),
            prompt: question.to_string(),
            top_k,
            filters: RetrievalFilters::default(),
            timeout: None,
        };
        let retrieval = self.retriever.retrieve(&query).await?;
        self.answers.answer(question, &retrieval, video_id).await
    }
}
