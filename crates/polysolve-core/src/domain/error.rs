//! Pipeline-level error taxonomy.
//!
//! These errors never cross `run_pipeline`: the controller converts each one
//! into a [`Diagnostic`](super::Diagnostic) on the result.

use super::diagnostic::DiagnosticKind;

/// Structurally fatal or stage-level failures inside the pipeline core.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no roles could be produced for the problem statement")]
    NoRoles,

    #[error("evidence collection failed for all {roles} role(s)")]
    AllEvidenceFailed { roles: usize },

    #[error("formatting failed: {0}")]
    Formatting(String),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("problem statement rejected: {0}")]
    InvalidProblem(String),
}

impl PipelineError {
    /// Diagnostic kind recorded when this error ends a run.
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            PipelineError::NoRoles => DiagnosticKind::NoRoles,
            PipelineError::AllEvidenceFailed { .. } => DiagnosticKind::AllEvidenceFailed,
            PipelineError::Formatting(_) => DiagnosticKind::FormattingError,
            PipelineError::InvalidConfig(_) => DiagnosticKind::InvalidConfig,
            PipelineError::InvalidProblem(_) => DiagnosticKind::InvalidProblem,
        }
    }
}

/// Result type for pipeline stage operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_evidence_failed_display_names_role_count() {
        let err = PipelineError::AllEvidenceFailed { roles: 3 };
        assert!(err.to_string().contains("all 3 role(s)"));
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::AllEvidenceFailed);
    }

    #[test]
    fn test_formatting_error_maps_to_formatting_kind() {
        let err = PipelineError::Formatting("blank candidate".to_string());
        assert!(err.to_string().contains("blank candidate"));
        assert_eq!(err.diagnostic_kind(), DiagnosticKind::FormattingError);
    }
}
