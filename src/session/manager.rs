//! Session state machine and cleanup
//!
//! Transitions are `active -> expiring -> purged`. The move to `expiring`
//! happens on TTL elapse or an explicit close; the move to `purged` only once
//! every in-flight ingestion and retrieval operation referencing the session
//! has finished. In-flight tracking is cooperative: callers hold an
//! [`OperationGuard`] for the duration of each operation and the guard's drop
//! releases the count. Deletion itself is owned here, nowhere else.

use crate::config::SessionConfig;
use crate::error::{Result, VideoRagError};
use crate::session::{Session, SessionState};
use crate::storage::VideoStore;
use std::time::Duration;

/// Drives session expiry and purge against the shared store
#[derive(Clone)]
pub struct SessionManager {
    store: VideoStore,
    config: SessionConfig,
}

/// RAII marker for one in-flight operation against a session.
///
/// Purge waits until every guard for the session is dropped.
pub struct OperationGuard {
    store: VideoStore,
    session_id: String,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if let Err(e) = self.store.adjust_inflight(&self.session_id, -1) {
            log::warn!(
                "Failed to release in-flight count for session {}: {}",
                self.session_id,
                e
            );
        }
    }
}

impl SessionManager {
    /// Create a manager over the given store
    pub fn new(store: VideoStore, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Allocate a new session namespace with the configured TTL.
    ///
    /// The embedding model is pinned at creation; every later query must use
    /// the same model so vectors stay in one space.
    pub fn create_session(&self, embedding_model: &str) -> Result<Session> {
        let now = chrono::Utc::now().timestamp();
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Active,
            created_at: now,
            expires_at: now + self.config.ttl_seconds as i64,
            embedding_model: embedding_model.to_string(),
        };
        self.store.insert_session(&session)?;
        log::info!(
            "Created session {} (ttl {}s, model {})",
            session.session_id,
            self.config.ttl_seconds,
            embedding_model
        );
        Ok(session)
    }

    /// Fetch a session, failing with `SessionExpired` when it is gone or no
    /// longer active.
    pub fn require_active(&self, session_id: &str) -> Result<Session> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| VideoRagError::InvalidInput(format!("unknown session {}", session_id)))?;
        match session.state {
            SessionState::Active => Ok(session),
            SessionState::Expiring | SessionState::Purged => Err(VideoRagError::SessionExpired(
                session_id.to_string(),
            )),
        }
    }

    /// Register one in-flight operation. Fails when the session is not
    /// active; the returned guard must live for the operation's duration.
    pub fn begin_operation(&self, session_id: &str) -> Result<OperationGuard> {
        self.require_active(session_id)?;
        self.store.adjust_inflight(session_id, 1)?;

        // The session may have flipped to expiring between the check and the
        // increment. Re-check so a draining session never gains work.
        match self.require_active(session_id) {
            Ok(_) => Ok(OperationGuard {
                store: self.store.clone(),
                session_id: session_id.to_string(),
            }),
            Err(e) => {
                let _ = self.store.adjust_inflight(session_id, -1);
                Err(e)
            }
        }
    }

    /// Explicitly close a session: begin draining and purge if already idle.
    pub fn close_session(&self, session_id: &str) -> Result<()> {
        if self
            .store
            .cas_session_state(session_id, SessionState::Active, SessionState::Expiring)?
        {
            log::info!("Session {} closed, draining", session_id);
        }
        self.try_purge(session_id)?;
        Ok(())
    }

    /// Purge a draining session if no operations are in flight.
    /// Returns true when the purge happened.
    pub fn try_purge(&self, session_id: &str) -> Result<bool> {
        let session = match self.store.get_session(session_id)? {
            Some(s) => s,
            None => return Ok(false),
        };
        if session.state != SessionState::Expiring {
            return Ok(false);
        }
        if self.store.session_inflight(session_id)? > 0 {
            log::debug!("Session {} still has in-flight operations", session_id);
            return Ok(false);
        }

        // CAS guards against a concurrent sweeper purging the same session.
        if !self
            .store
            .cas_session_state(session_id, SessionState::Expiring, SessionState::Purged)?
        {
            return Ok(false);
        }
        self.store.delete_by_session(session_id)?;
        log::info!("Session {} purged", session_id);
        Ok(true)
    }

    /// One cleanup pass: move TTL-elapsed sessions to `expiring`, then purge
    /// every drained session. Safe to call from multiple workers.
    pub fn sweep(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        for session in self.store.list_expired_sessions(now)? {
            if self
                .store
                .cas_session_state(&session.session_id, SessionState::Active, SessionState::Expiring)?
            {
                log::info!("Session {} TTL elapsed, draining", session.session_id);
            }
        }

        let mut purged = 0;
        for session in self.store.list_expiring_sessions()? {
            if self.try_purge(&session.session_id)? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Spawn a background task running [`sweep`](Self::sweep) at the
    /// configured interval.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = Duration::from_secs(self.config.sweep_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.sweep() {
                    log::warn!("Session sweep failed: {}", e);
                }
            }
        })
    }
}
