//! Database schema definitions

/// Database schema version
pub const SCHEMA_VERSION: u32 = 1;

/// SQL for creating the sessions table
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    embedding_model TEXT NOT NULL,
    inflight INTEGER NOT NULL DEFAULT 0
);
"#;

/// SQL for creating the videos table
pub const CREATE_VIDEOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    video_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    duration REAL NOT NULL,
    status TEXT NOT NULL,
    failure_kind TEXT,
    failure_reason TEXT,
    last_step TEXT,
    updated_at INTEGER NOT NULL
);
"#;

/// SQL for creating the segments table
pub const CREATE_SEGMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS segments (
    segment_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    start_s REAL NOT NULL,
    end_s REAL NOT NULL,
    transcript TEXT NOT NULL,
    captions TEXT NOT NULL,
    chunk_ids TEXT NOT NULL
);
"#;

/// SQL for creating the chunks table
pub const CREATE_CHUNKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    video_id TEXT NOT NULL,
    segment_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    embedding BLOB NOT NULL
);
"#;

/// SQL for creating the metadata table
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQL for creating indexes used by session-scoped lookups and deletions
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_videos_session ON videos(session_id);
CREATE INDEX IF NOT EXISTS idx_segments_session ON segments(session_id);
CREATE INDEX IF NOT EXISTS idx_segments_video ON segments(video_id);
CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id);
CREATE INDEX IF NOT EXISTS idx_chunks_video ON chunks(video_id);
CREATE INDEX IF NOT EXISTS idx_chunks_segment ON chunks(segment_id);
"#;
