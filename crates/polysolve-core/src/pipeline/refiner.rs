//! Bounded, scored refinement of the synthesized solution.
//!
//! Each iteration asks the text generator for a solution grounded in the
//! fact-checked evidence, scores it with the rubric, and keeps the best
//! candidate seen. The loop stops at the quality threshold, at the iteration
//! cap, or at the run deadline, whichever comes first.

use tokio::time::Instant;
use tracing::{instrument, warn};

use crate::capability::{call_with_retry, CancelSignal, CapabilityError, TextGenerator};
use crate::config::PipelineConfig;
use crate::domain::{
    BagStatus, Candidate, Diagnostic, DiagnosticKind, EvidenceSet, FactCheckResult,
    ProblemStatement, Role, Stage, Verdict,
};
use crate::obs;

use super::rubric::score_content;

/// Marker line opening every synthesis prompt.
pub const SYNTHESIS_TASK: &str = "TASK: SYNTHESIZE SOLUTION";

/// Everything refinement reads; borrowed from the controller.
#[derive(Debug, Clone, Copy)]
pub struct RefinementInput<'a> {
    pub problem: &'a ProblemStatement,
    pub roles: &'a [Role],
    pub evidence: &'a EvidenceSet,
    pub fact_check: &'a FactCheckResult,
    /// Prior session summary, passed to the generator as context.
    pub prior_context: Option<&'a str>,
}

/// Result of the refinement loop.
#[derive(Debug, Clone, Default)]
pub struct RefinementOutcome {
    /// Highest-scoring candidate; ties keep the earlier one.
    pub best: Option<Candidate>,
    /// Every scored candidate, in iteration order.
    pub candidates: Vec<Candidate>,
    /// Iterations started.
    pub iterations_used: u32,
    /// Whether the best candidate reached the quality threshold.
    pub converged: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the refinement loop.
///
/// The deadline is checked before every iteration; the generation call is
/// raced against `cancel`. Failed or empty generations consume their
/// iteration.
#[instrument(skip_all, fields(max_iterations = config.max_iterations))]
pub async fn refine(
    input: RefinementInput<'_>,
    generator: &dyn TextGenerator,
    config: &PipelineConfig,
    deadline: Instant,
    cancel: &CancelSignal,
) -> RefinementOutcome {
    let mut outcome = RefinementOutcome::default();

    for iteration in 1..=config.max_iterations {
        if cancel.is_cancelled() || Instant::now() >= deadline {
            outcome.diagnostics.push(Diagnostic::warning(
                DiagnosticKind::RefinementTimeout,
                Stage::Refinement,
                format!("run deadline reached before iteration {iteration}"),
            ));
            break;
        }
        outcome.iterations_used = iteration;

        let prompt = synthesis_prompt(&input, iteration, config.max_iterations, outcome.best.as_ref());
        let operation = format!("synthesize:{iteration}");
        let generated = call_with_retry(&config.retry, cancel, &operation, || {
            generator.generate(&prompt, input.prior_context)
        })
        .await;

        let content = match generated {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                outcome.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::GenerationFailed,
                    Stage::Refinement,
                    format!("iteration {iteration} produced no text"),
                ));
                continue;
            }
            Err(CapabilityError::Cancelled) => {
                outcome.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::RefinementTimeout,
                    Stage::Refinement,
                    format!("run deadline reached during iteration {iteration}"),
                ));
                break;
            }
            Err(e) => {
                warn!(iteration, error = %e, "synthesis failed");
                outcome.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::GenerationFailed,
                    Stage::Refinement,
                    format!("iteration {iteration} failed: {e}"),
                ));
                continue;
            }
        };

        let (score, breakdown) =
            score_content(&content, input.roles, input.evidence, input.fact_check);
        let candidate = Candidate {
            content,
            score,
            breakdown,
            iteration,
        };
        outcome.candidates.push(candidate.clone());

        let improved = outcome.best.as_ref().map_or(true, |best| score > best.score);
        if improved {
            outcome.best = Some(candidate);
        }
        let best_score = outcome.best.as_ref().map_or(score, |b| b.score);
        obs::emit_refinement_iteration(iteration, score.value(), best_score.value());

        if best_score.value() >= config.quality_threshold {
            outcome.converged = true;
            break;
        }
    }

    outcome
}

/// Prompt for iteration `iteration`; from the second iteration on it carries
/// the best candidate so far and its rubric breakdown.
pub fn synthesis_prompt(
    input: &RefinementInput<'_>,
    iteration: u32,
    max_iterations: u32,
    best: Option<&Candidate>,
) -> String {
    let mut prompt = format!(
        "{SYNTHESIS_TASK}\nIteration: {iteration} of {max_iterations}\nProblem: {}\n\nRoles:\n",
        input.problem.text().trim()
    );
    for role in input.roles {
        let status = input
            .evidence
            .bag(role.id)
            .map_or(BagStatus::Failed, |b| b.status);
        prompt.push_str(&format!(
            "- {} {}: {} (evidence {status})\n",
            role.id, role.name, role.rationale
        ));
    }

    prompt.push_str("\nEvidence (cite claims inline with their marker, e.g. [R1-C1]):\n");
    for claim in input.evidence.claims() {
        let (verdict, confidence) = input
            .fact_check
            .assessment(&claim.id)
            .map_or((Verdict::Inconclusive, claim.confidence), |a| {
                (a.verdict, a.adjusted_confidence)
            });
        let uri = claim.sources.first().map_or("-", |s| s.uri.as_str());
        prompt.push_str(&format!(
            "- {} ({verdict}, confidence {confidence:.2}) {} <{uri}>\n",
            claim.id.marker(),
            claim.text
        ));
    }

    if !input.fact_check.conflicts.is_empty() {
        prompt.push_str("\nConflicting claims:\n");
        for conflict in &input.fact_check.conflicts {
            prompt.push_str(&format!(
                "- {} vs {} ({})\n",
                conflict.claim_a.marker(),
                conflict.claim_b.marker(),
                conflict.basis
            ));
        }
    }

    if let Some(best) = best {
        prompt.push_str(&format!(
            "\nBest attempt so far (score {}; coverage {:.2}, completeness {:.2}, \
             contradiction rate {:.2}):\n{}\n",
            best.score,
            best.breakdown.citation_coverage,
            best.breakdown.role_completeness,
            best.breakdown.contradiction_rate,
            best.content.trim()
        ));
        prompt.push_str(
            "\nImprove on it: cite more supported claims, cover every role, and drop \
             contradicted claims.\n",
        );
    }

    prompt.push_str(
        "\nWrite the solution in Markdown with headed sections. Start with a short \
         summary. Cite supported claims with their markers; do not cite contradicted claims.\n",
    );
    prompt
}

/// Deterministic candidate built from the evidence when refinement produced
/// nothing: one section per role listing its supported claims, or its
/// unverified ones when none were supported.
pub fn fallback_candidate(
    problem: &ProblemStatement,
    roles: &[Role],
    evidence: &EvidenceSet,
    fact_check: &FactCheckResult,
) -> Candidate {
    let mut content = format!(
        "No synthesized solution was produced for \"{}\". The collected evidence is \
         summarized per role.\n",
        problem.text().trim()
    );
    for role in roles {
        content.push_str(&format!("\n## {}\n\n", role.name));
        let claims: Vec<_> = evidence
            .bag(role.id)
            .map(|b| b.claims.iter().collect())
            .unwrap_or_default();
        let supported: Vec<_> = claims
            .iter()
            .filter(|c| fact_check.verdict(&c.id) == Some(Verdict::Supported))
            .collect();
        let unverified: Vec<_> = claims
            .iter()
            .filter(|c| fact_check.verdict(&c.id) != Some(Verdict::Contradicted))
            .collect();

        if !supported.is_empty() {
            for c in supported {
                content.push_str(&format!("- {} {}\n", c.text, c.id.marker()));
            }
        } else if !unverified.is_empty() {
            for c in unverified {
                content.push_str(&format!("- (unverified) {} {}\n", c.text, c.id.marker()));
            }
        } else {
            content.push_str("- No usable evidence was collected.\n");
        }
    }

    let (score, breakdown) = score_content(&content, roles, evidence, fact_check);
    Candidate {
        content,
        score,
        breakdown,
        iteration: 0,
    }
}
