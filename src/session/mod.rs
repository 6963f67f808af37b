//! Session lifecycle for videorag-rs
//!
//! A session is the isolation boundary: every persisted row references one,
//! and nothing outlives it. The manager drives the `active -> expiring ->
//! purged` state machine and owns deletion.

pub mod manager;

pub use manager::{OperationGuard, SessionManager};

use serde::{Deserialize, Serialize};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Accepting ingestion and retrieval
    Active,
    /// TTL elapsed or closed; draining in-flight operations before purge
    Expiring,
    /// All rows deleted; every further operation fails with SessionExpired
    Purged,
}

impl SessionState {
    /// Stable string form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Expiring => "expiring",
            SessionState::Purged => "purged",
        }
    }

    /// Parse the stored string form
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionState::Active),
            "expiring" => Some(SessionState::Expiring),
            "purged" => Some(SessionState::Purged),
            _ => None,
        }
    }
}

/// One retrieval namespace with its expiry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// UUID namespace id
    pub session_id: String,
    /// Current lifecycle state
    pub state: SessionState,
    /// Creation time, unix seconds
    pub created_at: i64,
    /// Absolute expiry time, unix seconds
    pub expires_at: i64,
    /// Embedding model pinned at creation so query vectors stay compatible
    pub embedding_model: String,
}

impl Session {
    /// Whether the TTL has elapsed at `now` (unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
