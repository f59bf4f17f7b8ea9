//! The formatted, immutable output of a run.

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use super::assessment::{RankedOption, ScenarioAssessment};
use super::candidate::{Score, ScoreBreakdown};
use super::diagnostic::{Diagnostic, DiagnosticKind, Severity};
use super::evidence::{BagStatus, ClaimId, Source};
use super::role::RoleId;
use super::stage::Stage;
use super::verdict::{ClaimConflict, Verdict};

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Done,
    Failed,
}

/// One presentation section of the solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    /// Body with markers rewritten to `[n]` citation numbers.
    pub body: String,
    /// Citation numbers referenced in this section, in order of appearance.
    pub citations: Vec<u32>,
}

/// A resolved inline citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub number: u32,
    pub claim_id: ClaimId,
    pub role_name: String,
    pub claim_text: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub sources: Vec<Source>,
}

/// Per-role transparency record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleStatusSummary {
    pub role_id: RoleId,
    pub name: String,
    pub rationale: String,
    pub status: BagStatus,
    pub claim_count: usize,
    pub supported: usize,
    pub contradicted: usize,
    /// Mean adjusted confidence over the role's claims (0 with no claims).
    pub mean_confidence: f64,
    pub diagnostic: Option<String>,
}

/// The accepted solution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub sections: Vec<Section>,
    pub score: Option<Score>,
    pub breakdown: Option<ScoreBreakdown>,
    pub iterations_used: u32,
    /// Whether refinement reached the quality threshold.
    pub converged: bool,
}

impl Solution {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Final output of `run_pipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub run_id: String,
    pub session_id: Option<String>,
    pub problem: String,
    pub state: RunState,
    pub solution: Solution,
    pub citations: Vec<Citation>,
    pub roles: Vec<RoleStatusSummary>,
    pub conflicts: Vec<ClaimConflict>,
    /// Risk review of the accepted solution; absent for failed runs.
    #[serde(default)]
    pub assessment: Option<ScenarioAssessment>,
    /// Refinement candidates ranked best first.
    #[serde(default)]
    pub options: Vec<RankedOption>,
    /// Stages entered, in order, ending in `Done` or `Failed`.
    pub stage_trace: Vec<Stage>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything except the run id, which is random per run.
#[derive(Serialize)]
struct DigestView<'a> {
    session_id: &'a Option<String>,
    problem: &'a str,
    state: RunState,
    solution: &'a Solution,
    citations: &'a [Citation],
    roles: &'a [RoleStatusSummary],
    conflicts: &'a [ClaimConflict],
    assessment: &'a Option<ScenarioAssessment>,
    options: &'a [RankedOption],
    stage_trace: &'a [Stage],
    diagnostics: &'a [Diagnostic],
}

impl SolveResult {
    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }

    /// Roles that did not complete with status `Ok`.
    pub fn degraded_roles(&self) -> Vec<&RoleStatusSummary> {
        self.roles
            .iter()
            .filter(|r| r.status != BagStatus::Ok)
            .collect()
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    pub fn fatal_diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Fatal)
    }

    /// Section bodies joined as plain text.
    pub fn solution_text(&self) -> String {
        self.solution
            .sections
            .iter()
            .map(|s| format!("{}\n{}", s.heading, s.body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// SHA-256 hex digest of the deterministic content (run id excluded).
    pub fn content_digest(&self) -> String {
        let view = DigestView {
            session_id: &self.session_id,
            problem: &self.problem,
            state: self.state,
            solution: &self.solution,
            citations: &self.citations,
            roles: &self.roles,
            conflicts: &self.conflicts,
            assessment: &self.assessment,
            options: &self.options,
            stage_trace: &self.stage_trace,
            diagnostics: &self.diagnostics,
        };
        // Plain data with string keys only; serialization cannot fail.
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        hex::encode(sha2::Sha256::digest(&bytes))
    }

    /// Render the result as a Markdown report.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.problem.trim()));

        if self.is_failed() {
            out.push_str("**Run failed.**");
            if let Some(fatal) = self.fatal_diagnostic() {
                out.push_str(&format!(" {}", fatal.message));
            }
            out.push_str("\n\n");
        }

        for section in &self.solution.sections {
            out.push_str(&format!("## {}\n\n{}\n\n", section.heading, section.body.trim()));
        }

        if let Some(score) = self.solution.score {
            out.push_str(&format!(
                "_Score {} after {} iteration(s){}._\n\n",
                score,
                self.solution.iterations_used,
                if self.solution.converged { ", converged" } else { "" }
            ));
        }

        if let Some(assessment) = &self.assessment {
            out.push_str("## Risk Assessment\n\n");
            for (label, items) in [
                ("Strengths", &assessment.strengths),
                ("Weaknesses", &assessment.weaknesses),
            ] {
                if items.is_empty() {
                    continue;
                }
                out.push_str(&format!("**{label}**\n\n"));
                for item in items {
                    out.push_str(&format!("- {item}\n"));
                }
                out.push('\n');
            }
            if !assessment.risks.is_empty() {
                out.push_str("**Risks**\n\n");
                for risk in &assessment.risks {
                    out.push_str(&format!("- ({}) {}\n", risk.level, risk.description));
                }
                out.push('\n');
            }
        }

        if !self.options.is_empty() {
            out.push_str("## Ranked Options\n\n| Rank | Option | Feasibility | Impact | Novelty | Confidence | Overall |\n|---|---|---|---|---|---|---|\n");
            for o in &self.options {
                let marker = if o.accepted { " (accepted)" } else { "" };
                out.push_str(&format!(
                    "| {} | {}{} | {:.2} | {:.2} | {:.2} | {:.2} | {} |\n",
                    o.rank, o.title, marker, o.feasibility, o.impact, o.novelty, o.confidence, o.overall
                ));
            }
            out.push('\n');
        }

        if !self.citations.is_empty() {
            out.push_str("## References\n\n");
            for c in &self.citations {
                let uri = c.sources.first().map(|s| s.uri.as_str()).unwrap_or("-");
                out.push_str(&format!(
                    "{}. {} ({}, {}) {}\n",
                    c.number, c.claim_text, c.role_name, c.verdict, uri
                ));
            }
            out.push('\n');
        }

        if !self.roles.is_empty() {
            out.push_str("## Roles\n\n| Role | Status | Claims | Supported | Contradicted |\n|---|---|---|---|---|\n");
            for r in &self.roles {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    r.name, r.status, r.claim_count, r.supported, r.contradicted
                ));
            }
            out.push('\n');
        }

        if !self.diagnostics.is_empty() {
            out.push_str("## Diagnostics\n\n");
            for d in &self.diagnostics {
                out.push_str(&format!("- {d}\n"));
            }
        }

        out
    }
}
