//! SurrealDB-backed SessionStore implementation
//!
//! Rows live in the `sessions` table with a unique index on `session_id`.
//! Any engine URL accepted by `surrealdb::engine::any::connect` works:
//! `mem://`, `surrealkv://<path>`, `ws://host:port`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StateError;
use crate::session::{validate_session_id, SessionSnapshot, SessionStore};
use crate::StateResult;

const NAMESPACE: &str = "polysolve";
const DATABASE: &str = "sessions";

mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRow {
    session_id: String,
    run_id: String,
    problem: String,
    summary: String,
    content_digest: String,
    #[serde(with = "surreal_datetime")]
    saved_at: DateTime<Utc>,
}

impl From<SessionSnapshot> for SessionRow {
    fn from(s: SessionSnapshot) -> Self {
        Self {
            session_id: s.session_id,
            run_id: s.run_id,
            problem: s.problem,
            summary: s.summary,
            content_digest: s.content_digest,
            saved_at: s.saved_at,
        }
    }
}

impl From<SessionRow> for SessionSnapshot {
    fn from(r: SessionRow) -> Self {
        Self {
            session_id: r.session_id,
            run_id: r.run_id,
            problem: r.problem,
            summary: r.summary,
            content_digest: r.content_digest,
            saved_at: r.saved_at,
        }
    }
}

/// SurrealDB-backed implementation of [`SessionStore`].
#[derive(Clone)]
pub struct SurrealSessionStore {
    db: Surreal<Any>,
}

impl SurrealSessionStore {
    /// Create an in-memory instance (tests, one-shot CLI runs).
    pub async fn in_memory() -> StateResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to `url`, select `polysolve/sessions` and define the schema.
    #[instrument]
    pub async fn connect(url: &str) -> StateResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let store = Self { db };
        store.init_schema().await?;
        info!("SurrealSessionStore connected ({})", url);
        Ok(store)
    }

    async fn init_schema(&self) -> StateResult<()> {
        let sql = r#"
            DEFINE TABLE IF NOT EXISTS sessions SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS idx_session_id ON TABLE sessions COLUMNS session_id UNIQUE;
        "#;
        self.db.query(sql).await?.check()?;
        debug!("sessions table initialized");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SurrealSessionStore {
    async fn get(&self, session_id: &str) -> StateResult<Option<SessionSnapshot>> {
        validate_session_id(session_id)?;
        let sid = session_id.to_string();
        let mut res = self
            .db
            .query(
                "SELECT session_id, run_id, problem, summary, content_digest, saved_at \
                 FROM sessions WHERE session_id = $sid",
            )
            .bind(("sid", sid))
            .await?;

        let rows: Vec<SessionRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(SessionSnapshot::from))
    }

    async fn put(&self, snapshot: SessionSnapshot) -> StateResult<()> {
        validate_session_id(&snapshot.session_id)?;
        let sid = snapshot.session_id.clone();
        let row = SessionRow::from(snapshot);

        self.db
            .query("DELETE sessions WHERE session_id = $sid; CREATE sessions CONTENT $row;")
            .bind(("sid", sid))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }
}
