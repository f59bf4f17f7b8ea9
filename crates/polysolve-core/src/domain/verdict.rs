//! Fact-check output.

use serde::{Deserialize, Serialize};

use super::evidence::ClaimId;
use super::role::RoleId;

/// Verdict reached for a single claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Supported,
    Contradicted,
    Inconclusive,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Supported => "supported",
            Verdict::Contradicted => "contradicted",
            Verdict::Inconclusive => "inconclusive",
        };
        f.write_str(s)
    }
}

/// Verdict plus adjusted confidence for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimAssessment {
    pub claim_id: ClaimId,
    pub verdict: Verdict,
    /// Confidence after corroboration, in `[0, 1]`.
    pub adjusted_confidence: f64,
    /// Claims from other roles that agreed with this one.
    pub corroborated_by: Vec<ClaimId>,
    /// Whether a supplementary search was spent on this claim.
    pub looked_up: bool,
}

/// Two claims from different roles that contradict each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimConflict {
    pub claim_a: ClaimId,
    pub role_a: RoleId,
    pub claim_b: ClaimId,
    pub role_b: RoleId,
    /// What made the claims comparable (shared source or shared terms).
    pub basis: String,
}

/// Fact-check output covering every claim exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactCheckResult {
    /// One entry per claim, in evidence order.
    pub assessments: Vec<ClaimAssessment>,
    /// Claims finalized as `Inconclusive`.
    pub unresolved: Vec<ClaimId>,
    pub conflicts: Vec<ClaimConflict>,
    /// Supplementary searches actually issued.
    pub lookups_used: u32,
}

impl FactCheckResult {
    pub fn assessment(&self, id: &ClaimId) -> Option<&ClaimAssessment> {
        self.assessments.iter().find(|a| a.claim_id == *id)
    }

    pub fn verdict(&self, id: &ClaimId) -> Option<Verdict> {
        self.assessment(id).map(|a| a.verdict)
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.assessments
            .iter()
            .filter(|a| a.verdict == verdict)
            .count()
    }

    pub fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &ClaimAssessment> {
        self.assessments
            .iter()
            .filter(move |a| a.verdict == verdict)
    }
}
