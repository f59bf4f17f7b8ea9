//! Cross-role fact checking.
//!
//! Claims from different roles are compared pairwise. Two claims are related
//! when they cite the same source or their key terms overlap enough; related
//! claims agree when their polarity matches and contradict when one is
//! negated and the other is not. Claims nobody else speaks to may get one
//! supplementary search each, up to a per-run cap.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use crate::capability::{call_with_retry, CancelSignal, CapabilityError, SearchProvider};
use crate::config::PipelineConfig;
use crate::domain::{
    Claim, ClaimAssessment, ClaimConflict, ClaimId, Diagnostic, DiagnosticKind, EvidenceSet,
    FactCheckResult, RoleId, Source, Stage, Verdict,
};
use crate::obs;

use super::collector::first_sentence;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "also", "aren", "because", "been", "before", "being", "between",
    "both", "could", "couldn", "didn", "does", "doesn", "each", "from", "further", "hasn", "have",
    "haven", "into", "isn", "just", "more", "most", "much", "only", "other", "over", "same",
    "should", "shouldn", "some", "such", "than", "that", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "under", "very", "wasn", "were", "weren",
    "what", "when", "where", "which", "while", "will", "with", "would", "wouldn", "your",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "cannot", "without", "none", "neither", "nor",
];

/// Agreement bonus is capped at this much confidence.
const MAX_AGREEMENT_BONUS: f64 = 0.3;

/// Fact-check output plus lookup diagnostics.
#[derive(Debug, Clone)]
pub struct FactCheckOutcome {
    pub result: FactCheckResult,
    pub diagnostics: Vec<Diagnostic>,
}

/// Comparable view of a claim or search hit.
#[derive(Debug, Clone)]
struct Profile {
    id: Option<ClaimId>,
    role: Option<RoleId>,
    terms: BTreeSet<String>,
    uris: BTreeSet<String>,
    negated: bool,
}

impl Profile {
    fn of_claim(claim: &Claim) -> Self {
        Self {
            id: Some(claim.id),
            role: Some(claim.role_id),
            terms: key_terms(&claim.text),
            uris: claim.sources.iter().map(|s| s.uri.clone()).collect(),
            negated: is_negated(&claim.text),
        }
    }

    fn of_hit(hit: &Source) -> Self {
        let text = first_sentence(&hit.snippet);
        Self {
            id: None,
            role: None,
            terms: key_terms(&text),
            uris: BTreeSet::from([hit.uri.clone()]),
            negated: is_negated(&text),
        }
    }

    /// Why `self` and `other` speak about the same thing, if they do.
    fn relation(&self, other: &Profile, threshold: f64) -> Option<String> {
        if let Some(uri) = self.uris.intersection(&other.uris).next() {
            return Some(format!("shared source {uri}"));
        }
        let similarity = jaccard(&self.terms, &other.terms);
        (similarity >= threshold).then(|| format!("key-term overlap {similarity:.2}"))
    }
}

/// Lowercased words of four or more characters, minus stop-words, with a
/// trailing plural `s` dropped.
pub(crate) fn key_terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 4 && !STOP_WORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 4 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
        .collect()
}

/// Whether `text` contains a negation marker.
pub(crate) fn is_negated(text: &str) -> bool {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '’')
                .to_lowercase()
        })
        .any(|w| NEGATIONS.contains(&w.as_str()) || w.ends_with("n't") || w.ends_with("n’t"))
}

pub(crate) fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Confidence after fact checking.
///
/// Supported claims gain 0.1 per agreeing claim (at most 0.3); contradicted
/// claims keep a quarter; inconclusive claims keep 60%.
pub fn adjust_confidence(base: f64, verdict: Verdict, agreements: usize) -> f64 {
    let adjusted = match verdict {
        Verdict::Supported => base + (0.1 * agreements as f64).min(MAX_AGREEMENT_BONUS),
        Verdict::Contradicted => base * 0.25,
        Verdict::Inconclusive => base * 0.6,
    };
    adjusted.clamp(0.0, 1.0)
}

/// Pairwise cross-role comparison; no external calls.
///
/// Assessments follow evidence order. A claim with any contradiction is
/// `Contradicted`, else `Supported` when another role agrees, else
/// `Inconclusive`. Each contradicting pair is reported once.
pub fn cross_check(evidence: &EvidenceSet, overlap_threshold: f64) -> FactCheckResult {
    let claims: Vec<&Claim> = evidence.claims().collect();
    let profiles: Vec<Profile> = claims.iter().map(|c| Profile::of_claim(c)).collect();
    let mut result = FactCheckResult::default();

    for (i, claim) in claims.iter().enumerate() {
        let mut agreements = Vec::new();
        let mut contradicted = false;

        for (j, other) in claims.iter().enumerate() {
            if i == j || other.role_id == claim.role_id {
                continue;
            }
            let Some(basis) = profiles[i].relation(&profiles[j], overlap_threshold) else {
                continue;
            };
            if profiles[i].negated == profiles[j].negated {
                agreements.push(other.id);
            } else {
                contradicted = true;
                if i < j {
                    result.conflicts.push(ClaimConflict {
                        claim_a: claim.id,
                        role_a: claim.role_id,
                        claim_b: other.id,
                        role_b: other.role_id,
                        basis,
                    });
                }
            }
        }

        let verdict = if contradicted {
            Verdict::Contradicted
        } else if !agreements.is_empty() {
            Verdict::Supported
        } else {
            Verdict::Inconclusive
        };
        result.assessments.push(ClaimAssessment {
            claim_id: claim.id,
            verdict,
            adjusted_confidence: adjust_confidence(claim.confidence, verdict, agreements.len()),
            corroborated_by: agreements,
            looked_up: false,
        });
    }

    result
}

/// Verdict for `claim` from supplementary search hits. Hits from the claim's
/// own sources do not count.
fn judge_lookup(claim: &Profile, hits: &[Source], overlap_threshold: f64) -> Verdict {
    let mut supported = false;
    for hit in hits.iter().filter(|h| !claim.uris.contains(&h.uri)) {
        let profile = Profile::of_hit(hit);
        if claim.relation(&profile, overlap_threshold).is_none() {
            continue;
        }
        if profile.negated != claim.negated {
            return Verdict::Contradicted;
        }
        supported = true;
    }
    if supported {
        Verdict::Supported
    } else {
        Verdict::Inconclusive
    }
}

/// Assess every claim in `evidence`.
///
/// Runs [`cross_check`], then spends up to `lookup_cap` supplementary
/// searches on `Inconclusive` claims in evidence order. Lookup failures are
/// recorded and leave the claim `Inconclusive`.
#[instrument(skip_all, fields(claims = evidence.claim_count()))]
pub async fn fact_check(
    evidence: &EvidenceSet,
    search: &dyn SearchProvider,
    config: &PipelineConfig,
    cancel: &CancelSignal,
) -> FactCheckOutcome {
    let mut result = cross_check(evidence, config.overlap_threshold);
    let mut diagnostics = Vec::new();

    let pending: Vec<usize> = result
        .assessments
        .iter()
        .enumerate()
        .filter(|(_, a)| a.verdict == Verdict::Inconclusive)
        .map(|(idx, _)| idx)
        .collect();

    for idx in pending {
        if result.lookups_used >= config.lookup_cap {
            break;
        }
        if cancel.is_cancelled() {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::Cancelled,
                Stage::FactCheck,
                "fact-check lookups cut short by the run deadline",
            ));
            break;
        }
        let id = result.assessments[idx].claim_id;
        let Some(claim) = evidence.claim(&id) else {
            continue;
        };

        result.lookups_used += 1;
        result.assessments[idx].looked_up = true;
        let operation = format!("lookup:{id}");
        match call_with_retry(&config.retry, cancel, &operation, || search.search(&claim.text)).await {
            Ok(hits) => {
                let verdict =
                    judge_lookup(&Profile::of_claim(claim), &hits, config.overlap_threshold);
                debug!(claim = %id, hits = hits.len(), verdict = %verdict, "lookup judged");
                if verdict != Verdict::Inconclusive {
                    let assessment = &mut result.assessments[idx];
                    assessment.verdict = verdict;
                    assessment.adjusted_confidence = adjust_confidence(claim.confidence, verdict, 1);
                }
            }
            Err(CapabilityError::Cancelled) => {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::Cancelled,
                    Stage::FactCheck,
                    "fact-check lookups cut short by the run deadline",
                ));
                break;
            }
            Err(e) => {
                warn!(claim = %id, error = %e, "fact-check lookup failed");
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::FactCheckLookupFailed,
                        Stage::FactCheck,
                        format!("lookup for {id} failed: {e}"),
                    )
                    .for_role(id.role),
                );
            }
        }
    }

    result.unresolved = result
        .with_verdict(Verdict::Inconclusive)
        .map(|a| a.claim_id)
        .collect();

    obs::emit_fact_check_finished(
        result.count(Verdict::Supported),
        result.count(Verdict::Contradicted),
        result.count(Verdict::Inconclusive),
        result.lookups_used,
    );
    FactCheckOutcome {
        result,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BagStatus, EvidenceBag};

    fn claim(role: u32, seq: u32, text: &str, uri: &str) -> Claim {
        Claim::new(
            ClaimId::new(RoleId(role), seq),
            text,
            vec![Source {
                uri: uri.to_string(),
                snippet: text.to_string(),
            }],
            0.8,
        )
    }

    fn evidence(claims: Vec<Claim>) -> EvidenceSet {
        let mut roles: Vec<RoleId> = claims.iter().map(|c| c.role_id).collect();
        roles.dedup();
        EvidenceSet::from_bags(
            roles
                .into_iter()
                .map(|r| EvidenceBag {
                    role_id: r,
                    claims: claims.iter().filter(|c| c.role_id == r).cloned().collect(),
                    status: BagStatus::Ok,
                    diagnostic: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_key_terms_drop_short_and_stop_words() {
        let terms = key_terms("The batteries were cheaper than expected in 2023");
        assert!(terms.contains("batterie"));
        assert!(terms.contains("cheaper"));
        assert!(terms.contains("2023"));
        assert!(!terms.contains("were"));
        assert!(!terms.contains("than"));
        assert!(!terms.contains("the"));
    }

    #[test]
    fn test_negation_detection() {
        assert!(is_negated("Recycling does not reduce demand."));
        assert!(is_negated("Recycling doesn't reduce demand."));
        assert!(!is_negated("Recycling reduces demand."));
        assert!(!is_negated("Nothing notable."));
    }

    #[test]
    fn test_adjust_confidence_caps_bonus() {
        assert!((adjust_confidence(0.5, Verdict::Supported, 1) - 0.6).abs() < 1e-9);
        assert!((adjust_confidence(0.5, Verdict::Supported, 9) - 0.8).abs() < 1e-9);
        assert_eq!(adjust_confidence(0.95, Verdict::Supported, 3), 1.0);
        assert!((adjust_confidence(0.8, Verdict::Contradicted, 0) - 0.2).abs() < 1e-9);
        assert!((adjust_confidence(0.5, Verdict::Inconclusive, 0) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_cross_check_agreement_and_contradiction() {
        let set = evidence(vec![
            claim(1, 1, "Battery recycling reduces lithium demand.", "https://a"),
            claim(2, 1, "Battery recycling reduces lithium demand sharply.", "https://b"),
            claim(3, 1, "Battery recycling does not reduce lithium demand.", "https://c"),
            claim(3, 2, "Charging stations are expanding in rural areas.", "https://d"),
        ]);
        let result = cross_check(&set, 0.3);

        assert_eq!(result.assessments.len(), 4);
        let r3c1 = ClaimId::new(RoleId(3), 1);
        assert_eq!(result.verdict(&r3c1), Some(Verdict::Contradicted));
        assert_eq!(result.verdict(&ClaimId::new(RoleId(1), 1)), Some(Verdict::Contradicted));
        assert_eq!(
            result.verdict(&ClaimId::new(RoleId(3), 2)),
            Some(Verdict::Inconclusive)
        );
        assert_eq!(result.conflicts.len(), 2);
        assert!(result.conflicts.iter().all(|c| c.claim_b == r3c1));
    }

    #[test]
    fn test_cross_check_same_role_claims_are_not_compared() {
        let set = evidence(vec![
            claim(1, 1, "Heat pumps cut heating emissions.", "https://a"),
            claim(1, 2, "Heat pumps cut heating emissions.", "https://a"),
        ]);
        let result = cross_check(&set, 0.3);
        assert_eq!(result.count(Verdict::Inconclusive), 2);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_cross_check_shared_source_supports() {
        let set = evidence(vec![
            claim(1, 1, "Grid storage prices fell.", "https://same"),
            claim(2, 1, "Completely different wording here.", "https://same"),
        ]);
        let result = cross_check(&set, 0.9);
        assert_eq!(result.count(Verdict::Supported), 2);
        let a = result.assessment(&ClaimId::new(RoleId(1), 1)).unwrap();
        assert_eq!(a.corroborated_by, vec![ClaimId::new(RoleId(2), 1)]);
        assert!((a.adjusted_confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_judge_lookup_ignores_own_source() {
        let c = claim(1, 1, "Solar capacity doubled in Europe.", "https://own");
        let profile = Profile::of_claim(&c);
        let own = vec![Source {
            uri: "https://own".into(),
            snippet: "Solar capacity doubled in Europe.".into(),
        }];
        assert_eq!(judge_lookup(&profile, &own, 0.3), Verdict::Inconclusive);

        let other = vec![Source {
            uri: "https://other".into(),
            snippet: "Solar capacity has not doubled in Europe.".into(),
        }];
        assert_eq!(judge_lookup(&profile, &other, 0.3), Verdict::Contradicted);
    }
}
