//! Polysolve-State: session persistence for the Polysolve pipeline.
//!
//! The pipeline controller consults a [`SessionStore`] at intake (to pick up
//! the previous answer for a conversation) and writes a fresh
//! [`SessionSnapshot`] once a result has been formatted. Nothing else in the
//! pipeline touches persistence.
//!
//! ## Key Components
//!
//! - `SessionStore`: narrow async `get` / `put` trait keyed by session id
//! - `SessionSnapshot`: what survives between runs of one session
//! - `SurrealSessionStore`: SurrealDB backend (in-memory, local file or remote)
//! - `fakes::MemorySessionStore`: in-process store for tests

mod error;
pub mod fakes;
pub mod session;
mod surreal;

pub use error::StateError;
pub use session::{validate_session_id, SessionSnapshot, SessionStore};
pub use surreal::SurrealSessionStore;

/// Result type for polysolve-state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
