//! Polysolve core: multi-role, evidence-grounded problem solving.
//!
//! A run identifies the expertise a problem needs, researches each role in
//! parallel against a search capability, cross-checks the gathered claims,
//! iteratively refines a synthesized solution against a quality rubric, and
//! formats the accepted candidate with resolved citations.
//!
//! # Module layout
//!
//! - [`domain`] — data model shared by every stage
//! - [`capability`] — `TextGenerator` / `SearchProvider` seams, retry, fakes
//! - [`pipeline`] — stage implementations and the controller
//! - [`config`] — `PipelineConfig`
//! - [`obs`] / [`telemetry`] — tracing events and subscriber setup

pub mod capability;
pub mod config;
pub mod domain;
pub mod obs;
pub mod pipeline;
pub mod telemetry;

pub use capability::{
    CapabilityError, CapabilityResult, RetryPolicy, SearchProvider, TextGenerator,
};
pub use config::PipelineConfig;
pub use domain::{
    BagStatus, Candidate, Citation, Claim, ClaimId, Diagnostic, DiagnosticKind, EvidenceBag,
    EvidenceSet, FactCheckResult, PipelineError, ProblemStatement, RankedOption, Risk, RiskLevel,
    Role, RoleId, RunState, ScenarioAssessment, Score, Section, Severity, SolveResult, Solution,
    Source, Stage, Verdict,
};
pub use pipeline::{run_pipeline, Pipeline};
pub use telemetry::init_tracing;

/// Polysolve version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
