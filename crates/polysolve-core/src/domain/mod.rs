//! Domain models for Polysolve.
//!
//! Canonical definitions for the data that flows between pipeline stages:
//! - `ProblemStatement`: immutable request input
//! - `Role`: an area of expertise, referenced downstream by `RoleId`
//! - `Claim` / `EvidenceBag` / `EvidenceSet`: attributed, source-backed findings
//! - `FactCheckResult`: one verdict per claim
//! - `Candidate`: a scored refinement attempt
//! - `ScenarioAssessment` / `RankedOption`: risk review and candidate ranking
//! - `SolveResult`: the immutable, formatted output of a run

pub mod assessment;
pub mod candidate;
pub mod diagnostic;
pub mod error;
pub mod evidence;
pub mod problem;
pub mod result;
pub mod role;
pub mod stage;
pub mod verdict;

pub use assessment::{RankedOption, Risk, RiskLevel, ScenarioAssessment};
pub use candidate::{Candidate, Score, ScoreBreakdown};
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use error::{PipelineError, PipelineResult};
pub use evidence::{BagStatus, Claim, ClaimId, EvidenceBag, EvidenceSet, Source};
pub use problem::ProblemStatement;
pub use result::{Citation, RoleStatusSummary, RunState, Section, SolveResult, Solution};
pub use role::{normalize_role_name, Role, RoleId};
pub use stage::Stage;
pub use verdict::{ClaimAssessment, ClaimConflict, FactCheckResult, Verdict};
