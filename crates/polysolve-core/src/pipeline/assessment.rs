//! Scenario review and ranking of refinement candidates.
//!
//! Both are derived from data the run already holds (rubric breakdowns,
//! fact-check verdicts, role statuses) and issue no capability calls, so
//! identical inputs give identical output.

use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::{
    BagStatus, Candidate, ClaimId, EvidenceSet, FactCheckResult, RankedOption, Risk, RiskLevel,
    Role, RoleId, ScenarioAssessment, Score, Verdict,
};

use super::formatter::{split_sections, SUMMARY_HEADING};
use super::rubric::{cited_claims, find_markers};

/// Strengths listed per assessment.
const MAX_STRENGTHS: usize = 5;

/// Option titles are cut at this many characters.
const MAX_TITLE_CHARS: usize = 80;

/// Everything the review reads; borrowed from the controller.
#[derive(Debug, Clone, Copy)]
pub struct AssessmentInput<'a> {
    /// The candidate that will be presented.
    pub accepted: &'a Candidate,
    /// Every scored refinement candidate, in iteration order.
    pub candidates: &'a [Candidate],
    pub roles: &'a [Role],
    pub evidence: &'a EvidenceSet,
    pub fact_check: &'a FactCheckResult,
    pub converged: bool,
}

/// Review the accepted candidate for strengths, weaknesses and risks.
pub fn assess_scenario(input: AssessmentInput<'_>) -> ScenarioAssessment {
    let candidate = input.accepted;
    let cited = distinct_known_claims(&candidate.content, input.evidence);
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut risks = Vec::new();

    for id in &cited {
        let (Some(claim), Some(assessment)) =
            (input.evidence.claim(id), input.fact_check.assessment(id))
        else {
            continue;
        };
        match assessment.verdict {
            Verdict::Supported if strengths.len() < MAX_STRENGTHS => {
                let basis = if assessment.corroborated_by.is_empty() {
                    "confirmed by an independent source".to_string()
                } else {
                    format!("corroborated by {} other role(s)", assessment.corroborated_by.len())
                };
                strengths.push(format!("{} ({basis})", claim.text));
            }
            Verdict::Supported => {}
            Verdict::Inconclusive => {
                weaknesses.push(format!("Rests on an unverified claim: {}", claim.text));
            }
            Verdict::Contradicted => risks.push(Risk::new(
                RiskLevel::High,
                format!("Relies on a contradicted claim: {}", claim.text),
            )),
        }
    }

    let live_roles = input
        .roles
        .iter()
        .filter(|r| input.evidence.bag(r.id).is_some_and(|b| b.status != BagStatus::Failed))
        .count();
    if live_roles > 1 && candidate.breakdown.role_completeness >= 1.0 {
        strengths.push(format!("Draws on all {live_roles} contributing roles"));
    }

    for role in input.roles {
        match input.evidence.bag(role.id).map_or(BagStatus::Failed, |b| b.status) {
            BagStatus::Ok => {}
            BagStatus::Degraded => {
                weaknesses.push(format!("Only partial evidence from the {}", role.name));
            }
            BagStatus::Failed => {
                weaknesses.push(format!("No evidence from the {}", role.name));
            }
        }
    }
    if candidate.breakdown.citation_coverage < 0.5 {
        weaknesses.push(format!(
            "Cites {:.0}% of the supported evidence",
            candidate.breakdown.citation_coverage * 100.0
        ));
    }

    for conflict in &input.fact_check.conflicts {
        let text = |id: &ClaimId| {
            input
                .evidence
                .claim(id)
                .map_or_else(|| id.to_string(), |c| c.text.clone())
        };
        risks.push(Risk::new(
            RiskLevel::High,
            format!(
                "{} and {} disagree: \"{}\" vs \"{}\"",
                role_name(input.roles, conflict.role_a),
                role_name(input.roles, conflict.role_b),
                text(&conflict.claim_a),
                text(&conflict.claim_b),
            ),
        ));
    }
    if candidate.iteration == 0 {
        risks.push(Risk::new(
            RiskLevel::Medium,
            "No synthesized plan; the solution is a digest of the raw evidence",
        ));
    } else if !input.converged {
        risks.push(Risk::new(
            RiskLevel::Medium,
            format!("Quality threshold not reached (best score {})", candidate.score),
        ));
    }
    if risks.is_empty() {
        risks.push(Risk::new(
            RiskLevel::Low,
            "No contradictions or unresolved gaps in the cited evidence",
        ));
    }
    risks.sort_by(|a, b| b.level.cmp(&a.level));

    debug!(
        strengths = strengths.len(),
        weaknesses = weaknesses.len(),
        risks = risks.len(),
        "scenario assessed"
    );
    ScenarioAssessment {
        strengths,
        weaknesses,
        risks,
    }
}

/// Rank `input.candidates` on feasibility, impact, novelty and confidence.
///
/// Sorted by the mean of the four, best first; ties keep iteration order.
/// The accepted candidate is ranked too when it is not among the scored
/// ones (the evidence digest).
pub fn rank_options(input: AssessmentInput<'_>) -> Vec<RankedOption> {
    let mut pool: Vec<&Candidate> = input.candidates.iter().collect();
    if !pool.iter().any(|c| c.iteration == input.accepted.iteration) {
        pool.push(input.accepted);
    }

    let cited: Vec<BTreeSet<ClaimId>> = pool
        .iter()
        .map(|c| distinct_known_claims(&c.content, input.evidence))
        .collect();

    let mut options: Vec<RankedOption> = pool
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let own = &cited[idx];
            let novelty = if own.is_empty() {
                0.0
            } else {
                let unique = own
                    .iter()
                    .filter(|id| {
                        cited
                            .iter()
                            .enumerate()
                            .all(|(other, set)| other == idx || !set.contains(id))
                    })
                    .count();
                unique as f64 / own.len() as f64
            };
            let confidence = mean_confidence(own, input.evidence, input.fact_check);
            let feasibility = 1.0 - candidate.breakdown.contradiction_rate;
            let impact = candidate.breakdown.role_completeness;
            RankedOption {
                rank: 0,
                iteration: candidate.iteration,
                title: option_title(&candidate.content),
                feasibility,
                impact,
                novelty,
                confidence,
                overall: Score::new((feasibility + impact + novelty + confidence) / 4.0),
                accepted: candidate.iteration == input.accepted.iteration,
            }
        })
        .collect();

    options.sort_by(|a, b| b.overall.cmp(&a.overall).then(a.iteration.cmp(&b.iteration)));
    for (option, rank) in options.iter_mut().zip(1u32..) {
        option.rank = rank;
    }
    options
}

fn distinct_known_claims(content: &str, evidence: &EvidenceSet) -> BTreeSet<ClaimId> {
    cited_claims(content)
        .into_iter()
        .filter(|id| evidence.claim(id).is_some())
        .collect()
}

fn mean_confidence(
    ids: &BTreeSet<ClaimId>,
    evidence: &EvidenceSet,
    fact_check: &FactCheckResult,
) -> f64 {
    if ids.is_empty() {
        return 0.0;
    }
    let total: f64 = ids
        .iter()
        .filter_map(|id| {
            let claim = evidence.claim(id)?;
            Some(
                fact_check
                    .assessment(id)
                    .map_or(claim.confidence, |a| a.adjusted_confidence),
            )
        })
        .sum();
    total / ids.len() as f64
}

fn role_name(roles: &[Role], id: RoleId) -> String {
    roles
        .iter()
        .find(|r| r.id == id)
        .map_or_else(|| id.to_string(), |r| r.name.clone())
}

/// First line of the summary, else the first heading, with citation
/// markers removed.
fn option_title(content: &str) -> String {
    let raw = split_sections(content)
        .into_iter()
        .find_map(|(heading, body)| {
            if heading == SUMMARY_HEADING {
                body.lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
            } else {
                Some(heading)
            }
        })
        .unwrap_or_default();
    let raw = raw.as_str();

    let mut title = String::with_capacity(raw.len());
    let mut last = 0;
    for marker in find_markers(raw) {
        title.push_str(&raw[last..marker.range.start]);
        last = marker.range.end;
    }
    title.push_str(&raw[last..]);
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    title
        .trim_end_matches(['.', ':'])
        .trim_end()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Claim, ClaimAssessment, ClaimConflict, EvidenceBag, ScoreBreakdown};

    fn fixture() -> (Vec<Role>, EvidenceSet, FactCheckResult) {
        let roles = vec![
            Role::new(RoleId(1), "Chemist", "a"),
            Role::new(RoleId(2), "Economist", "b"),
            Role::new(RoleId(3), "Planner", "c"),
        ];
        let claim = |r: u32, s: u32, text: &str| {
            Claim::new(ClaimId::new(RoleId(r), s), text, vec![], 0.8)
        };
        let evidence = EvidenceSet::from_bags(vec![
            EvidenceBag {
                role_id: RoleId(1),
                claims: vec![
                    claim(1, 1, "Sodium cells avoid lithium."),
                    claim(1, 2, "Solid-state cells ship in 2025."),
                ],
                status: BagStatus::Ok,
                diagnostic: None,
            },
            EvidenceBag {
                role_id: RoleId(2),
                claims: vec![claim(2, 1, "Solid-state cells do not ship in 2025.")],
                status: BagStatus::Ok,
                diagnostic: None,
            },
            EvidenceBag::failed(RoleId(3), "down"),
        ]);
        let assess = |r: u32, s: u32, verdict, confidence| ClaimAssessment {
            claim_id: ClaimId::new(RoleId(r), s),
            verdict,
            adjusted_confidence: confidence,
            corroborated_by: vec![],
            looked_up: verdict == Verdict::Supported,
        };
        let fact_check = FactCheckResult {
            assessments: vec![
                assess(1, 1, Verdict::Supported, 0.9),
                assess(1, 2, Verdict::Contradicted, 0.2),
                assess(2, 1, Verdict::Contradicted, 0.2),
            ],
            conflicts: vec![ClaimConflict {
                claim_a: ClaimId::new(RoleId(1), 2),
                role_a: RoleId(1),
                claim_b: ClaimId::new(RoleId(2), 1),
                role_b: RoleId(2),
                basis: "shared terms".into(),
            }],
            ..Default::default()
        };
        (roles, evidence, fact_check)
    }

    fn candidate(content: &str, iteration: u32, contradiction_rate: f64) -> Candidate {
        Candidate {
            content: content.to_string(),
            score: Score::new(0.6),
            breakdown: ScoreBreakdown {
                citation_coverage: 1.0,
                role_completeness: 1.0,
                contradiction_rate,
            },
            iteration,
        }
    }

    #[test]
    fn test_assessment_separates_strengths_weaknesses_and_risks() {
        let (roles, evidence, fc) = fixture();
        let accepted = candidate("Go sodium [R1-C1].\n## Timing\nWait [R1-C2].", 1, 0.5);
        let review = assess_scenario(AssessmentInput {
            accepted: &accepted,
            candidates: std::slice::from_ref(&accepted),
            roles: &roles,
            evidence: &evidence,
            fact_check: &fc,
            converged: false,
        });

        assert_eq!(review.strengths.len(), 2);
        assert!(review.strengths[0].starts_with("Sodium cells avoid lithium."));
        assert!(review.strengths[1].contains("2 contributing roles"));
        assert_eq!(review.weaknesses, vec!["No evidence from the Planner".to_string()]);

        let levels: Vec<RiskLevel> = review.risks.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![RiskLevel::High, RiskLevel::High, RiskLevel::Medium]);
        assert!(review.risks[1].description.starts_with("Chemist and Economist disagree"));
        assert_eq!(review.highest_risk(), Some(RiskLevel::High));
    }

    #[test]
    fn test_clean_evidence_yields_a_single_low_risk() {
        let (roles, evidence, mut fc) = fixture();
        fc.conflicts.clear();
        let accepted = candidate("Go sodium [R1-C1].", 1, 0.0);
        let review = assess_scenario(AssessmentInput {
            accepted: &accepted,
            candidates: std::slice::from_ref(&accepted),
            roles: &roles[..2],
            evidence: &evidence,
            fact_check: &fc,
            converged: true,
        });
        assert_eq!(review.risks.len(), 1);
        assert_eq!(review.risks[0].level, RiskLevel::Low);
    }

    #[test]
    fn test_options_rank_by_mean_of_criteria() {
        let (roles, evidence, fc) = fixture();
        let first = candidate("# Wait for solid-state\nThey ship soon [R1-C2].", 1, 1.0);
        let second = candidate("## Switch to sodium [R1-C1]\nNo lithium needed [R1-C1].", 2, 0.0);
        let candidates = vec![first, second.clone()];

        let options = rank_options(AssessmentInput {
            accepted: &second,
            candidates: &candidates,
            roles: &roles,
            evidence: &evidence,
            fact_check: &fc,
            converged: true,
        });

        assert_eq!(options.len(), 2);
        assert_eq!(options[0].iteration, 2);
        assert_eq!(options[0].rank, 1);
        assert_eq!(options[0].title, "Switch to sodium");
        assert!(options[0].accepted);
        assert_eq!(options[0].feasibility, 1.0);
        assert_eq!(options[0].novelty, 1.0);
        assert!((options[0].confidence - 0.9).abs() < 1e-9);
        assert!((options[0].overall.value() - 0.975).abs() < 1e-9);

        assert_eq!(options[1].rank, 2);
        assert_eq!(options[1].title, "Wait for solid-state");
        assert!(!options[1].accepted);
        assert_eq!(options[1].feasibility, 0.0);
    }

    #[test]
    fn test_shared_citations_lower_novelty_and_digest_is_ranked() {
        let (roles, evidence, fc) = fixture();
        let scored = vec![candidate("Sodium [R1-C1] and [R2-C1].", 1, 0.5)];
        let digest = candidate("No synthesized solution.\n## Chemist\n- Sodium [R1-C1]", 0, 0.0);

        let options = rank_options(AssessmentInput {
            accepted: &digest,
            candidates: &scored,
            roles: &roles,
            evidence: &evidence,
            fact_check: &fc,
            converged: false,
        });

        assert_eq!(options.len(), 2);
        let digest_option = options.iter().find(|o| o.iteration == 0).expect("digest ranked");
        assert!(digest_option.accepted);
        assert_eq!(digest_option.novelty, 0.0);
        assert_eq!(digest_option.title, "No synthesized solution");
        let scored_option = options.iter().find(|o| o.iteration == 1).expect("scored");
        assert_eq!(scored_option.novelty, 0.5);
    }

    #[test]
    fn test_title_falls_back_to_first_summary_line() {
        assert_eq!(option_title("\n  Cut cobalt [R1-C2].\nMore."), "Cut cobalt");
        assert_eq!(option_title(""), "");
    }
}
