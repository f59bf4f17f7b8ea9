//! External capability seams.
//!
//! The pipeline depends on two black-box services, both behind async traits
//! so tests substitute deterministic fakes:
//!
//! - [`TextGenerator`] — `generate(prompt, context?) -> text`
//! - [`SearchProvider`] — `search(query) -> [Source]`
//!
//! # Module layout
//!
//! - [`error`] — `CapabilityError`, `CapabilityResult`
//! - [`retry`] — `RetryPolicy`, `CancelSignal`, `call_with_retry`
//! - [`http`] — `HttpTextGenerator`, `HttpSearchProvider` (reqwest)
//! - [`fakes`] — `ScriptedGenerator`, `ScriptedSearch`

pub mod error;
pub mod fakes;
pub mod http;
pub mod retry;

use async_trait::async_trait;

use crate::domain::Source;

pub use error::{CapabilityError, CapabilityResult};
pub use retry::{call_with_retry, cancel_pair, CancelHandle, CancelSignal, RetryPolicy};

/// Text-generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`, optionally conditioned on `context`.
    async fn generate(&self, prompt: &str, context: Option<&str>) -> CapabilityResult<String>;
}

/// Search / grounding capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return source-backed snippets for `query`, best match first.
    async fn search(&self, query: &str) -> CapabilityResult<Vec<Source>>;
}
