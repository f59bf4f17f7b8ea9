//! Refinement attempts and their scores.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Totally ordered candidate score in `[0, 1]`.
///
/// NaN inputs collapse to `0.0` so that "best" is always well-defined.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Score(0.0);
        }
        // `+ 0.0` folds -0.0 into 0.0 so equality and ordering agree.
        Score(value.clamp(0.0, 1.0) + 0.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Rubric components behind a [`Score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Fraction of supported claims the content cites.
    pub citation_coverage: f64,
    /// Fraction of non-failed roles represented in the content.
    pub role_completeness: f64,
    /// Fraction of cited markers that point at contradicted or unknown claims.
    pub contradiction_rate: f64,
}

/// One refinement attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: String,
    pub score: Score,
    pub breakdown: ScoreBreakdown,
    /// 1-based refinement iteration that produced this candidate.
    pub iteration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_clamps_and_handles_nan() {
        assert_eq!(Score::new(1.5).value(), 1.0);
        assert_eq!(Score::new(-0.2).value(), 0.0);
        assert_eq!(Score::new(f64::NAN).value(), 0.0);
        assert_eq!(Score::new(-0.0), Score::new(0.0));
    }

    #[test]
    fn test_score_ordering_is_total() {
        let mut scores = vec![Score::new(0.4), Score::new(f64::NAN), Score::new(0.9)];
        scores.sort();
        assert_eq!(scores[0].value(), 0.0);
        assert_eq!(scores[2].value(), 0.9);
        assert!(Score::new(0.5) > Score::new(0.49));
    }
}
