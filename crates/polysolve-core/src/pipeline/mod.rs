//! Pipeline stages and the controller that sequences them.
//!
//! # Module layout
//!
//! - [`roles`] — Role Identifier (with generalist fallback)
//! - [`prompts`] — Prompt Generator (pure)
//! - [`collector`] — per-role Evidence Collector tasks (fan-out)
//! - [`aggregator`] — join barrier and merge into an `EvidenceSet` (fan-in)
//! - [`fact_check`] — cross-role verdicts and supplementary lookups
//! - [`rubric`] — citation markers and candidate scoring
//! - [`refiner`] — bounded refinement loop
//! - [`assessment`] — scenario review and ranked options (pure)
//! - [`formatter`] — sections, citations, role summaries (pure)
//! - [`context`] / [`controller`] — run state and the stage state machine

pub mod aggregator;
pub mod assessment;
pub mod collector;
pub mod context;
pub mod controller;
pub mod fact_check;
pub mod formatter;
pub mod prompts;
pub mod refiner;
pub mod roles;
pub mod rubric;

pub use aggregator::{aggregate, merge_reports, Aggregation};
pub use assessment::{assess_scenario, rank_options, AssessmentInput};
pub use collector::{collect_role, spawn_collectors, CollectorReport, CollectorTask};
pub use controller::{run_pipeline, Pipeline};
pub use fact_check::{cross_check, fact_check, FactCheckOutcome};
pub use formatter::{format_solution, role_summaries, FormatInput, Formatted};
pub use prompts::{generate_research_prompt, ResearchPrompt};
pub use refiner::{fallback_candidate, refine, RefinementInput, RefinementOutcome, SYNTHESIS_TASK};
pub use roles::{identify_roles, RoleIdentification, FALLBACK_ROLE_NAME, ROLE_IDENTIFICATION_TASK};
pub use rubric::score_content;
