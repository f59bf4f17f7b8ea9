//! Error types for external capability calls.

use crate::domain::DiagnosticKind;

/// Failure of a single generation or search call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// Retryable: rate limits, 5xx, dropped connections.
    #[error("transient capability failure: {0}")]
    Transient(String),

    /// Non-retryable failure of this call.
    #[error("capability failure: {0}")]
    Failed(String),

    #[error("capability call timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// The run deadline expired while the call was pending.
    #[error("capability call cancelled")]
    Cancelled,
}

impl CapabilityError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CapabilityError::Transient(_) | CapabilityError::Timeout { .. }
        )
    }

    /// Diagnostic kind recorded when this error is surfaced on a result.
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            CapabilityError::Transient(_) | CapabilityError::Timeout { .. } => {
                DiagnosticKind::TransientCapabilityError
            }
            CapabilityError::Failed(_) => DiagnosticKind::CapabilityError,
            CapabilityError::Cancelled => DiagnosticKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return CapabilityError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) => classify_status(status.as_u16(), err.to_string()),
            None => CapabilityError::Failed(err.to_string()),
        }
    }
}

/// Map an HTTP status to retryable or terminal.
pub(crate) fn classify_status(status: u16, detail: String) -> CapabilityError {
    match status {
        408 | 425 | 429 | 500..=599 => CapabilityError::Transient(format!("HTTP {status}: {detail}")),
        _ => CapabilityError::Failed(format!("HTTP {status}: {detail}")),
    }
}

/// Result type for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;
