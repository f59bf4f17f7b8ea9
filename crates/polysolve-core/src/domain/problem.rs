//! The request input.

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Immutable problem text plus optional session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemStatement {
    text: String,
    session_id: Option<String>,
}

impl ProblemStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// A problem needs at least one non-whitespace character.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::InvalidProblem(
                "problem statement is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_session_keeps_text() {
        let p = ProblemStatement::new("Design a grid").with_session("s-1");
        assert_eq!(p.text(), "Design a grid");
        assert_eq!(p.session_id(), Some("s-1"));
    }

    #[test]
    fn test_blank_problem_is_rejected() {
        assert!(ProblemStatement::new("  \n").validate().is_err());
        assert!(ProblemStatement::new("x").validate().is_ok());
    }
}
