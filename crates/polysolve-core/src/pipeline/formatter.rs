//! Presentation of the accepted candidate.
//!
//! Pure and deterministic: splits the candidate into sections, resolves
//! claim markers to numbered citations, and summarizes each role's evidence.

use std::collections::BTreeMap;

use crate::domain::{
    BagStatus, Candidate, Citation, ClaimId, Diagnostic, DiagnosticKind, EvidenceSet,
    FactCheckResult, PipelineError, PipelineResult, Role, RoleStatusSummary, Section, Solution,
    Stage, Verdict,
};

use super::rubric::find_markers;

/// Heading given to text that precedes the first Markdown heading.
pub const SUMMARY_HEADING: &str = "Summary";

/// Everything formatting reads.
#[derive(Debug, Clone, Copy)]
pub struct FormatInput<'a> {
    pub candidate: &'a Candidate,
    pub roles: &'a [Role],
    pub evidence: &'a EvidenceSet,
    pub fact_check: &'a FactCheckResult,
    pub iterations_used: u32,
    pub converged: bool,
}

/// Formatter output.
#[derive(Debug, Clone)]
pub struct Formatted {
    pub solution: Solution,
    pub citations: Vec<Citation>,
    pub roles: Vec<RoleStatusSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Marker renumbering state shared across sections.
#[derive(Default)]
struct Numbering {
    numbers: BTreeMap<ClaimId, u32>,
    order: Vec<ClaimId>,
    unknown: Vec<ClaimId>,
}

impl Numbering {
    /// Rewrite claim markers in `text` to `[n]`, collecting the numbers used.
    fn rewrite(&mut self, text: &str, evidence: &EvidenceSet, used: &mut Vec<u32>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for marker in find_markers(text) {
            out.push_str(&text[last..marker.range.start]);
            last = marker.range.end;
            for id in marker.ids {
                if evidence.claim(&id).is_none() {
                    if !self.unknown.contains(&id) {
                        self.unknown.push(id);
                    }
                    continue;
                }
                let number = match self.numbers.get(&id) {
                    Some(n) => *n,
                    None => {
                        self.order.push(id);
                        let n = self.order.len() as u32;
                        self.numbers.insert(id, n);
                        n
                    }
                };
                if !used.contains(&number) {
                    used.push(number);
                }
                out.push_str(&format!("[{number}]"));
            }
        }
        out.push_str(&text[last..]);
        out
    }
}

/// Format `input.candidate` into the presentation structure.
///
/// Blank content is a [`PipelineError::Formatting`]; unknown markers are
/// dropped with a warning diagnostic.
pub fn format_solution(input: FormatInput<'_>) -> PipelineResult<Formatted> {
    let content = input.candidate.content.trim();
    if content.is_empty() {
        return Err(PipelineError::Formatting(
            "candidate content is blank".to_string(),
        ));
    }

    let mut numbering = Numbering::default();
    let mut sections = Vec::new();
    for (heading, body) in split_sections(content) {
        let mut citations = Vec::new();
        let heading = numbering.rewrite(&heading, input.evidence, &mut citations);
        let body = numbering.rewrite(&body, input.evidence, &mut citations);
        let body = body.trim().to_string();
        if body.is_empty() && heading == SUMMARY_HEADING {
            continue;
        }
        sections.push(Section {
            heading: heading.trim().to_string(),
            body,
            citations,
        });
    }
    if sections.is_empty() {
        return Err(PipelineError::Formatting(
            "candidate has no presentable content".to_string(),
        ));
    }

    let diagnostics = numbering
        .unknown
        .iter()
        .map(|id| {
            Diagnostic::warning(
                DiagnosticKind::UnresolvedCitation,
                Stage::Formatting,
                format!("dropped citation to unknown claim {id}"),
            )
        })
        .collect();

    let citations = numbering
        .order
        .iter()
        .zip(1u32..)
        .filter_map(|(id, number)| citation(number, id, input))
        .collect();

    Ok(Formatted {
        solution: Solution {
            sections,
            score: Some(input.candidate.score),
            breakdown: Some(input.candidate.breakdown.clone()),
            iterations_used: input.iterations_used,
            converged: input.converged,
        },
        citations,
        roles: role_summaries(input.roles, input.evidence, input.fact_check),
        diagnostics,
    })
}

fn citation(number: u32, id: &ClaimId, input: FormatInput<'_>) -> Option<Citation> {
    let claim = input.evidence.claim(id)?;
    let assessment = input.fact_check.assessment(id);
    Some(Citation {
        number,
        claim_id: *id,
        role_name: input
            .roles
            .iter()
            .find(|r| r.id == id.role)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.role.to_string()),
        claim_text: claim.text.clone(),
        verdict: assessment.map_or(Verdict::Inconclusive, |a| a.verdict),
        confidence: assessment.map_or(claim.confidence, |a| a.adjusted_confidence),
        sources: claim.sources.clone(),
    })
}

/// `(heading, body)` pairs split on `#` to `###` headings. Text before the
/// first heading becomes the summary section.
pub fn split_sections(content: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut heading = SUMMARY_HEADING.to_string();
    let mut body = String::new();

    for line in content.lines() {
        if let Some(title) = heading_title(line) {
            if heading != SUMMARY_HEADING || !body.trim().is_empty() || !sections.is_empty() {
                sections.push((heading, std::mem::take(&mut body)));
            }
            heading = title.to_string();
            body.clear();
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    sections.push((heading, body));
    sections
}

fn heading_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let title = trimmed[hashes..].strip_prefix(' ')?.trim();
    (!title.is_empty()).then_some(title)
}

/// Per-role evidence summary, in role order.
pub fn role_summaries(
    roles: &[Role],
    evidence: &EvidenceSet,
    fact_check: &FactCheckResult,
) -> Vec<RoleStatusSummary> {
    roles
        .iter()
        .map(|role| {
            let bag = evidence.bag(role.id);
            let claims = bag.map(|b| b.claims.as_slice()).unwrap_or_default();
            let count = |v: Verdict| {
                claims
                    .iter()
                    .filter(|c| fact_check.verdict(&c.id) == Some(v))
                    .count()
            };
            let mean_confidence = if claims.is_empty() {
                0.0
            } else {
                claims
                    .iter()
                    .map(|c| {
                        fact_check
                            .assessment(&c.id)
                            .map_or(c.confidence, |a| a.adjusted_confidence)
                    })
                    .sum::<f64>()
                    / claims.len() as f64
            };
            RoleStatusSummary {
                role_id: role.id,
                name: role.name.clone(),
                rationale: role.rationale.clone(),
                status: bag.map_or(BagStatus::Failed, |b| b.status),
                claim_count: claims.len(),
                supported: count(Verdict::Supported),
                contradicted: count(Verdict::Contradicted),
                mean_confidence,
                diagnostic: bag.and_then(|b| b.diagnostic.clone()),
            }
        })
        .collect()
}
