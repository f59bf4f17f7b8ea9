//! In-memory fakes for the session store (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StateError;
use crate::session::{validate_session_id, SessionSnapshot, SessionStore};
use crate::StateResult;

/// In-memory session store backed by a `HashMap<session_id, snapshot>`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently stored.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> StateResult<Option<SessionSnapshot>> {
        validate_session_id(session_id)?;
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn put(&self, snapshot: SessionSnapshot) -> StateResult<()> {
        validate_session_id(&snapshot.session_id)?;
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))?;
        sessions.insert(snapshot.session_id.clone(), snapshot);
        Ok(())
    }
}

/// Store whose every operation fails; exercises the non-fatal session path.
#[derive(Debug, Default)]
pub struct UnavailableSessionStore;

#[async_trait]
impl SessionStore for UnavailableSessionStore {
    async fn get(&self, _session_id: &str) -> StateResult<Option<SessionSnapshot>> {
        Err(StateError::Connection("session store unavailable".to_string()))
    }

    async fn put(&self, _snapshot: SessionSnapshot) -> StateResult<()> {
        Err(StateError::Connection("session store unavailable".to_string()))
    }
}
