//! Diagnostics surfaced on the result.

use serde::{Deserialize, Serialize};

use super::role::RoleId;
use super::stage::Stage;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A retryable external call failed and retries were exhausted.
    TransientCapabilityError,
    /// A non-retryable external call failure.
    CapabilityError,
    /// No usable roles were produced; the fallback role was used.
    RoleIdentificationEmpty,
    /// More than K roles were produced; the tail was dropped.
    RolesTruncated,
    /// An identified role was discarded because its name was unusable.
    RoleNameRejected,
    EvidenceDegraded,
    EvidenceFailed,
    AllEvidenceFailed,
    /// Work abandoned because the run deadline expired.
    Cancelled,
    FactCheckLookupFailed,
    /// A refinement iteration produced no candidate.
    GenerationFailed,
    RefinementTimeout,
    /// The solution was built from evidence because refinement produced none.
    FallbackCandidate,
    UnresolvedCitation,
    FormattingError,
    SessionStoreError,
    InvalidConfig,
    InvalidProblem,
    NoRoles,
}

/// How bad it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    /// The run ended in `Failed`.
    Fatal,
}

/// A recorded, user-visible event of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    pub message: String,
}

impl Diagnostic {
    pub fn info(kind: DiagnosticKind, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, stage, message)
    }

    pub fn warning(kind: DiagnosticKind, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, stage, message)
    }

    pub fn fatal(kind: DiagnosticKind, stage: Stage, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Fatal, stage, message)
    }

    pub fn for_role(mut self, role_id: RoleId) -> Self {
        self.role_id = Some(role_id);
        self
    }

    fn new(kind: DiagnosticKind, severity: Severity, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            stage,
            role_id: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: ", self.severity, self.stage)?;
        if let Some(role) = self.role_id {
            write!(f, "{role}: ")?;
        }
        f.write_str(&self.message)
    }
}
