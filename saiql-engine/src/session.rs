//! Session lifecycle and per-session statistics
//!
//! Sessions are created on demand, tracked under a single lock, and
//! reaped once idle past the configured threshold.

use chrono::{DateTime, Utc};
use saiql_core::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Active,
    Paused,
    Completed,
    Error,
}

/// One execution session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub query_count: u64,
    pub total_execution_time: Duration,
}

impl Session {
    fn new(id: SessionId, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            state: SessionState::Created,
            created_at: now,
            last_activity: now,
            query_count: 0,
            total_execution_time: Duration::ZERO,
        }
    }
}

/// Session registry. All state mutation is serialized by one lock.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a fresh session.
    pub fn create(&self, user_id: Option<String>) -> SessionId {
        let id = SessionId::now_v7();
        self.sessions().insert(id, Session::new(id, user_id));
        info!(session = %id, "session created");
        id
    }

    /// Resolve the caller's session: reuse the given id (registering it
    /// if the registry has never seen it) or create a new one.
    pub fn ensure(&self, id: Option<SessionId>, user_id: Option<String>) -> SessionId {
        match id {
            Some(id) => {
                self.sessions()
                    .entry(id)
                    .or_insert_with(|| Session::new(id, user_id));
                id
            }
            None => self.create(user_id),
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions().get(&id).cloned()
    }

    /// Mark a query against the session and refresh its activity clock.
    pub fn record_query(&self, id: SessionId, state: SessionState, execution_time: Duration) {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get_mut(&id) {
            session.state = state;
            session.last_activity = Utc::now();
            session.query_count += 1;
            session.total_execution_time += execution_time;
        }
    }

    pub fn set_state(&self, id: SessionId, state: SessionState) {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get_mut(&id) {
            session.state = state;
            session.last_activity = Utc::now();
        }
    }

    /// Drop sessions idle longer than `max_idle`. Returns how many were
    /// reaped.
    pub fn reap_expired(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity >= cutoff);
        let reaped = before - sessions.len();
        if reaped > 0 {
            info!(reaped, "expired sessions cleaned up");
        }
        reaped
    }

    pub fn count(&self) -> usize {
        self.sessions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ensure_reuses_known_session() {
        let manager = SessionManager::new();
        let id = manager.create(Some("ada".to_string()));
        assert_eq!(manager.ensure(Some(id), None), id);
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_ensure_registers_foreign_session_id() {
        let manager = SessionManager::new();
        let foreign = SessionId::now_v7();
        assert_eq!(manager.ensure(Some(foreign), None), foreign);
        assert!(manager.get(foreign).is_some());
    }

    #[test]
    fn test_record_query_accumulates() {
        let manager = SessionManager::new();
        let id = manager.create(None);
        manager.record_query(id, SessionState::Completed, Duration::from_millis(5));
        manager.record_query(id, SessionState::Completed, Duration::from_millis(7));

        let session = manager.get(id).expect("session should exist");
        assert_eq!(session.query_count, 2);
        assert_eq!(session.total_execution_time, Duration::from_millis(12));
        assert_eq!(session.state, SessionState::Completed);
    }

    #[test]
    fn test_reap_expired_removes_idle_sessions() {
        let manager = SessionManager::new();
        let stale = manager.create(None);
        thread::sleep(Duration::from_millis(20));
        let fresh = manager.create(None);

        assert_eq!(manager.reap_expired(Duration::from_millis(10)), 1);
        assert!(manager.get(stale).is_none());
        assert!(manager.get(fresh).is_some());
    }
}
