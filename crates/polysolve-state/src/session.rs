//! Session trait definitions.
//!
//! A session links consecutive pipeline runs for the same caller. Only the
//! latest snapshot per session is retained; `put` replaces whatever was
//! stored before.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::StateResult;

const MAX_SESSION_ID_LEN: usize = 128;

/// What the pipeline remembers about a session between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    /// Run that produced this snapshot.
    pub run_id: String,
    /// Problem statement of that run.
    pub problem: String,
    /// Plain-text digest of the accepted solution, fed back as context.
    pub summary: String,
    /// `SolveResult::content_digest()` of the stored run.
    pub content_digest: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(
        session_id: impl Into<String>,
        run_id: impl Into<String>,
        problem: impl Into<String>,
        summary: impl Into<String>,
        content_digest: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            problem: problem.into(),
            summary: summary.into(),
            content_digest: content_digest.into(),
            saved_at: Utc::now(),
        }
    }
}

/// Keyed snapshot store consumed by the pipeline controller.
///
/// Guarantees:
/// - `get` returns `Ok(None)` for an unknown session, never an error.
/// - `put` overwrites: a subsequent `get` returns the last snapshot written.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the latest snapshot for `session_id`.
    async fn get(&self, session_id: &str) -> StateResult<Option<SessionSnapshot>>;

    /// Store `snapshot` as the latest for its session.
    async fn put(&self, snapshot: SessionSnapshot) -> StateResult<()>;
}

/// Reject ids that are empty, oversized or contain control characters.
pub fn validate_session_id(session_id: &str) -> StateResult<()> {
    if session_id.trim().is_empty() {
        return Err(StateError::InvalidSessionId("empty".to_string()));
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(StateError::InvalidSessionId(format!(
            "longer than {MAX_SESSION_ID_LEN} bytes"
        )));
    }
    if session_id.chars().any(char::is_control) {
        return Err(StateError::InvalidSessionId(
            "contains control characters".to_string(),
        ));
    }
    Ok(())
}
