//! Scenario review and option ranking attached to a finished run.

use serde::{Deserialize, Serialize};

use super::candidate::Score;

/// How much a risk threatens the accepted solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub level: RiskLevel,
    pub description: String,
}

impl Risk {
    pub fn new(level: RiskLevel, description: impl Into<String>) -> Self {
        Self {
            level,
            description: description.into(),
        }
    }
}

/// Strengths, weaknesses and risks of the accepted solution, judged against
/// the fact-checked evidence it cites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioAssessment {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// Highest level first.
    pub risks: Vec<Risk>,
}

impl ScenarioAssessment {
    pub fn highest_risk(&self) -> Option<RiskLevel> {
        self.risks.iter().map(|r| r.level).max()
    }
}

/// One refinement candidate scored on the ranking criteria.
///
/// Every criterion is in `[0, 1]`; `overall` is their mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOption {
    /// 1-based position, best first.
    pub rank: u32,
    /// Refinement iteration that produced the candidate (0 for the evidence digest).
    pub iteration: u32,
    pub title: String,
    /// Share of cited markers that are not contradicted or unknown.
    pub feasibility: f64,
    /// Share of contributing roles the candidate draws on.
    pub impact: f64,
    /// Share of its cited claims that no other candidate cites.
    pub novelty: f64,
    /// Mean adjusted confidence of the claims it cites.
    pub confidence: f64,
    pub overall: Score,
    /// Whether this is the candidate the rubric accepted.
    pub accepted: bool,
}
