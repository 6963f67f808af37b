//! SQLite-backed vector store adapter
//!
//! All coordination state lives here: sessions, videos, segments, embedding
//! chunks and job checkpoints. Every read and write is scoped by session id.
//! State transitions use compare-and-set updates (`UPDATE ... WHERE` plus an
//! affected-row check) so two workers never complete the same step twice.
//! WAL mode keeps deletions safe to run concurrently with queries.

use crate::embedding::EmbeddingChunk;
use crate::error::{Result, VideoRagError};
use crate::segment::{FrameCaption, Segment};
use crate::session::{Session, SessionState};
use crate::storage::schema::*;
use crate::storage::{VideoRecord, VideoStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// One nearest-neighbor candidate returned by [`VideoStore::query_chunks`]
#[derive(Debug, Clone)]
pub struct ChunkHit {
    /// Matched chunk id
    pub chunk_id: String,
    /// Owning segment
    pub segment_id: String,
    /// Owning video
    pub video_id: String,
    /// Segment start in seconds
    pub start: f64,
    /// Segment end in seconds
    pub end: f64,
    /// The chunk text (the matched excerpt)
    pub text: String,
    /// Cosine similarity against the query vector, in [-1, 1]
    pub similarity: f32,
}

/// Database connection and operations, cheap to clone across workers
#[derive(Clone)]
pub struct VideoStore {
    conn: Arc<Mutex<Connection>>,
}

impl VideoStore {
    /// Open (or create) a database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| VideoRagError::StorageUnavailable(format!("Failed to open database: {}", e)))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            VideoRagError::StorageUnavailable(format!("Failed to create in-memory database: {}", e))
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VideoRagError::StorageUnavailable("database mutex poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        // WAL mode so cleanup deletions never block in-flight readers
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| VideoRagError::StorageUnavailable(format!("Failed to enable WAL mode: {}", e)))?;

        for (name, sql) in [
            ("sessions", CREATE_SESSIONS_TABLE),
            ("videos", CREATE_VIDEOS_TABLE),
            ("segments", CREATE_SEGMENTS_TABLE),
            ("chunks", CREATE_CHUNKS_TABLE),
            ("metadata", CREATE_METADATA_TABLE),
        ] {
            conn.execute(sql, []).map_err(|e| {
                VideoRagError::StorageUnavailable(format!("Failed to create {} table: {}", name, e))
            })?;
        }

        conn.execute_batch(CREATE_INDEXES)
            .map_err(|e| VideoRagError::StorageUnavailable(format!("Failed to create indexes: {}", e)))?;

        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| VideoRagError::StorageUnavailable(format!("Failed to set schema version: {}", e)))?;

        log::info!("Database initialized with schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    // ----- sessions -----

    /// Insert a new session row in `active` state.
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO sessions (session_id, state, created_at, expires_at, embedding_model, inflight)
             VALUES (?, ?, ?, ?, ?, 0)",
            params![
                session.session_id,
                session.state.as_str(),
                session.created_at,
                session.expires_at,
                session.embedding_model,
            ],
        )?;
        Ok(())
    }

    /// Fetch a session by id.
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT session_id, state, created_at, expires_at, embedding_model
                 FROM sessions WHERE session_id = ?",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Compare-and-set a session state transition. Returns false when another
    /// worker already moved the session out of `from`.
    pub fn cas_session_state(&self, session_id: &str, from: SessionState, to: SessionState) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE sessions SET state = ? WHERE session_id = ? AND state = ?",
            params![to.as_str(), session_id, from.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Adjust the in-flight operation count and return the new value.
    pub fn adjust_inflight(&self, session_id: &str, delta: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET inflight = inflight + ? WHERE session_id = ?",
            params![delta, session_id],
        )?;
        let inflight: i64 = conn.query_row(
            "SELECT inflight FROM sessions WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(inflight)
    }

    /// Current in-flight operation count for a session.
    pub fn session_inflight(&self, session_id: &str) -> Result<i64> {
        let inflight = self.conn()?.query_row(
            "SELECT inflight FROM sessions WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(inflight)
    }

    /// Sessions whose TTL elapsed at `now` and are still active.
    pub fn list_expired_sessions(&self, now: i64) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, state, created_at, expires_at, embedding_model
             FROM sessions WHERE state = 'active' AND expires_at <= ?",
        )?;
        let rows = stmt.query_map(params![now], row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Sessions currently draining toward purge.
    pub fn list_expiring_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, state, created_at, expires_at, embedding_model
             FROM sessions WHERE state = 'expiring'",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    // ----- videos -----

    /// Insert or replace a video row.
    pub fn upsert_video(&self, video: &VideoRecord) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO videos
             (video_id, session_id, duration, status, failure_kind, failure_reason, last_step, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, strftime('%s','now'))",
            params![
                video.video_id,
                video.session_id,
                video.duration,
                video.status.as_str(),
                video.failure_kind,
                video.failure_reason,
                video.last_step,
            ],
        )?;
        Ok(())
    }

    /// Fetch a video by id.
    pub fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let conn = self.conn()?;
        let video = conn
            .query_row(
                "SELECT video_id, session_id, duration, status, failure_kind, failure_reason, last_step
                 FROM videos WHERE video_id = ?",
                params![video_id],
                row_to_video,
            )
            .optional()?;
        Ok(video)
    }

    /// Set a video's processing status, clearing any failure fields.
    pub fn set_video_status(&self, video_id: &str, status: VideoStatus) -> Result<()> {
        self.conn()?.execute(
            "UPDATE videos SET status = ?, failure_kind = NULL, failure_reason = NULL,
             updated_at = strftime('%s','now') WHERE video_id = ?",
            params![status.as_str(), video_id],
        )?;
        Ok(())
    }

    /// Mark a video failed with the causing error kind and human-readable reason.
    pub fn set_video_failure(&self, video_id: &str, kind: &str, reason: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE videos SET status = 'failed', failure_kind = ?, failure_reason = ?,
             updated_at = strftime('%s','now') WHERE video_id = ?",
            params![kind, reason, video_id],
        )?;
        Ok(())
    }

    /// Compare-and-set the job checkpoint (last completed step). Returns false
    /// when another worker already advanced past `from`.
    pub fn cas_video_step(&self, video_id: &str, from: Option<&str>, to: &str) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE videos SET last_step = ?, updated_at = strftime('%s','now')
             WHERE video_id = ? AND last_step IS ?",
            params![to, video_id, from],
        )?;
        Ok(changed == 1)
    }

    // ----- segments -----

    /// Upsert segments in one transaction, keyed by deterministic segment id.
    pub fn upsert_segments(&self, session_id: &str, segments: &[Segment]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO segments
                 (segment_id, session_id, video_id, start_s, end_s, transcript, captions, chunk_ids)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for segment in segments {
                stmt.execute(params![
                    segment.segment_id,
                    session_id,
                    segment.video_id,
                    segment.start,
                    segment.end,
                    segment.transcript,
                    serde_json::to_string(&segment.captions)?,
                    serde_json::to_string(&segment.chunk_embedding_ids)?,
                ])?;
            }
        }
        tx.commit()?;
        log::info!("Upserted {} segments for session {}", segments.len(), session_id);
        Ok(())
    }

    /// Fetch one segment by id.
    pub fn get_segment(&self, segment_id: &str) -> Result<Option<Segment>> {
        let conn = self.conn()?;
        let segment = conn
            .query_row(
                "SELECT segment_id, video_id, start_s, end_s, transcript, captions, chunk_ids
                 FROM segments WHERE segment_id = ?",
                params![segment_id],
                row_to_segment,
            )
            .optional()?;
        Ok(segment)
    }

    /// All segments of a video, ordered by start.
    pub fn get_segments(&self, video_id: &str) -> Result<Vec<Segment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT segment_id, video_id, start_s, end_s, transcript, captions, chunk_ids
             FROM segments WHERE video_id = ? ORDER BY start_s",
        )?;
        let rows = stmt.query_map(params![video_id], row_to_segment)?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }

    // ----- chunks -----

    /// Upsert embedding chunks, idempotent on chunk id.
    pub fn upsert_chunks(&self, session_id: &str, video_id: &str, chunks: &[EmbeddingChunk]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunks
                 (chunk_id, session_id, video_id, segment_id, chunk_index, text, token_count, embedding)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.chunk_id,
                    session_id,
                    video_id,
                    chunk.segment_id,
                    chunk.chunk_index as i64,
                    chunk.text,
                    chunk.token_count as i64,
                    embedding_to_blob(&chunk.vector),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Chunk ids stored for one segment, ordered by chunk index.
    pub fn get_chunk_ids_for_segment(&self, segment_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT chunk_id FROM chunks WHERE segment_id = ? ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![segment_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Total chunks stored for a session.
    pub fn count_chunks(&self, session_id: &str) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM chunks WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Nearest-neighbor scan over one session's chunks.
    ///
    /// Returns up to `limit` hits sorted by descending cosine similarity.
    /// Rows whose stored vector dimension differs from the query are skipped;
    /// the model pin on the session is what prevents that in practice.
    pub fn query_chunks(
        &self,
        session_id: &str,
        video_id: Option<&str>,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        let conn = self.conn()?;
        let sql = match video_id {
            Some(_) => {
                "SELECT c.chunk_id, c.segment_id, c.video_id, s.start_s, s.end_s, c.text, c.embedding
                 FROM chunks c JOIN segments s ON c.segment_id = s.segment_id
                 WHERE c.session_id = ? AND c.video_id = ?"
            }
            None => {
                "SELECT c.chunk_id, c.segment_id, c.video_id, s.start_s, s.end_s, c.text, c.embedding
                 FROM chunks c JOIN segments s ON c.segment_id = s.segment_id
                 WHERE c.session_id = ?"
            }
        };
        let mut stmt = conn.prepare(sql)?;

        let map_row = |row: &Row| -> rusqlite::Result<(ChunkHit, Vec<f32>)> {
            let blob: Vec<u8> = row.get(6)?;
            Ok((
                ChunkHit {
                    chunk_id: row.get(0)?,
                    segment_id: row.get(1)?,
                    video_id: row.get(2)?,
                    start: row.get(3)?,
                    end: row.get(4)?,
                    text: row.get(5)?,
                    similarity: 0.0,
                },
                blob_to_embedding(&blob),
            ))
        };

        let rows: Vec<rusqlite::Result<(ChunkHit, Vec<f32>)>> = match video_id {
            Some(vid) => stmt
                .query_map(params![session_id, vid], map_row)?
                .collect(),
            None => stmt.query_map(params![session_id], map_row)?.collect(),
        };

        let mut hits = Vec::new();
        for row in rows {
            let (mut hit, vector) = row?;
            if vector.len() != query_vector.len() {
                log::warn!(
                    "Skipping chunk {} with mismatched vector dimension {} (query has {})",
                    hit.chunk_id,
                    vector.len(),
                    query_vector.len()
                );
                continue;
            }
            hit.similarity = cosine_similarity(query_vector, &vector);
            hits.push(hit);
        }

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.start.total_cmp(&b.start))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    // ----- cleanup -----

    /// Delete every segment and chunk owned by a session and mark its videos
    /// expired. The session row remains as a tombstone so later requests get
    /// a SessionExpired answer instead of a silent miss.
    pub fn delete_by_session(&self, session_id: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let chunks = tx.execute("DELETE FROM chunks WHERE session_id = ?", params![session_id])?;
        let segments = tx.execute("DELETE FROM segments WHERE session_id = ?", params![session_id])?;
        tx.execute(
            "UPDATE videos SET status = 'expired', updated_at = strftime('%s','now')
             WHERE session_id = ?",
            params![session_id],
        )?;
        tx.commit()?;
        log::info!(
            "Purged session {}: {} chunks, {} segments",
            session_id,
            chunks,
            segments
        );
        Ok(chunks + segments)
    }

    /// Delete every segment and chunk of one video, keeping the video row.
    pub fn delete_by_video(&self, video_id: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let chunks = tx.execute("DELETE FROM chunks WHERE video_id = ?", params![video_id])?;
        let segments = tx.execute("DELETE FROM segments WHERE video_id = ?", params![video_id])?;
        tx.commit()?;
        Ok(chunks + segments)
    }
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let state_str: String = row.get(1)?;
    Ok(Session {
        session_id: row.get(0)?,
        state: SessionState::parse(&state_str).unwrap_or(SessionState::Purged),
        created_at: row.get(2)?,
        expires_at: row.get(3)?,
        embedding_model: row.get(4)?,
    })
}

fn row_to_video(row: &Row) -> rusqlite::Result<VideoRecord> {
    let status_str: String = row.get(3)?;
    Ok(VideoRecord {
        video_id: row.get(0)?,
        session_id: row.get(1)?,
        duration: row.get(2)?,
        status: VideoStatus::parse(&status_str).unwrap_or(VideoStatus::Failed),
        failure_kind: row.get(4)?,
        failure_reason: row.get(5)?,
        last_step: row.get(6)?,
    })
}

fn row_to_segment(row: &Row) -> rusqlite::Result<Segment> {
    let captions_json: String = row.get(5)?;
    let chunk_ids_json: String = row.get(6)?;
    let captions: Vec<FrameCaption> = serde_json::from_str(&captions_json).unwrap_or_default();
    let chunk_embedding_ids: Vec<String> = serde_json::from_str(&chunk_ids_json).unwrap_or_default();
    Ok(Segment {
        segment_id: row.get(0)?,
        video_id: row.get(1)?,
        start: row.get(2)?,
        end: row.get(3)?,
        transcript: row.get(4)?,
        captions,
        chunk_embedding_ids,
    })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
