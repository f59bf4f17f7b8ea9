//! Citation markers and the candidate quality rubric.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{
    BagStatus, ClaimId, EvidenceSet, FactCheckResult, Role, Score, ScoreBreakdown, Verdict,
};

const COVERAGE_WEIGHT: f64 = 0.4;
const COMPLETENESS_WEIGHT: f64 = 0.4;
const CONSISTENCY_WEIGHT: f64 = 0.2;

/// `[R1-C2]`, also `[R1-C2, R3-C1]`.
const MARKER_PATTERN: &str = r"\[\s*(R\d+-C\d+(?:\s*[,;]\s*R\d+-C\d+)*)\s*\]";

fn marker_regex() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(MARKER_PATTERN).ok()).as_ref()
}

/// A bracketed citation marker found in generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    /// Byte range of the whole bracket.
    pub range: Range<usize>,
    /// Claims cited inside the bracket, in order.
    pub ids: Vec<ClaimId>,
}

/// Every citation marker in `content`, in order of appearance.
pub fn find_markers(content: &str) -> Vec<MarkerMatch> {
    let Some(re) = marker_regex() else {
        return Vec::new();
    };
    re.captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let ids = caps
                .get(1)?
                .as_str()
                .split([',', ';'])
                .filter_map(ClaimId::parse)
                .collect();
            Some(MarkerMatch {
                range: whole.range(),
                ids,
            })
        })
        .collect()
}

/// Cited claim ids, in order of appearance (repeats included).
pub fn cited_claims(content: &str) -> Vec<ClaimId> {
    find_markers(content)
        .into_iter()
        .flat_map(|m| m.ids)
        .collect()
}

/// Score `content` against the rubric.
///
/// `0.4 * coverage + 0.4 * completeness + 0.2 * (1 - contradiction_rate)`:
/// coverage is the share of supported claims cited (1 when there are none),
/// completeness the share of non-failed roles represented by a cited claim
/// or by name (1 when every role failed), and contradiction rate the share
/// of cited markers pointing at contradicted or unknown claims.
pub fn score_content(
    content: &str,
    roles: &[Role],
    evidence: &EvidenceSet,
    fact_check: &FactCheckResult,
) -> (Score, ScoreBreakdown) {
    let cited = cited_claims(content);
    let cited_set: BTreeSet<ClaimId> = cited.iter().copied().collect();

    let supported: Vec<ClaimId> = fact_check
        .with_verdict(Verdict::Supported)
        .map(|a| a.claim_id)
        .collect();
    let citation_coverage = if supported.is_empty() {
        1.0
    } else {
        let hit = supported.iter().filter(|id| cited_set.contains(id)).count();
        hit as f64 / supported.len() as f64
    };

    let lowered = content.to_lowercase();
    let live_roles: Vec<&Role> = roles
        .iter()
        .filter(|r| {
            evidence
                .bag(r.id)
                .is_some_and(|b| b.status != BagStatus::Failed)
        })
        .collect();
    let role_completeness = if live_roles.is_empty() {
        1.0
    } else {
        let represented = live_roles
            .iter()
            .filter(|r| {
                cited_set.iter().any(|id| id.role == r.id)
                    || lowered.contains(&r.name.to_lowercase())
            })
            .count();
        represented as f64 / live_roles.len() as f64
    };

    let contradiction_rate = if cited.is_empty() {
        0.0
    } else {
        let bad = cited
            .iter()
            .filter(|id| {
                evidence.claim(id).is_none()
                    || fact_check.verdict(id) == Some(Verdict::Contradicted)
            })
            .count();
        bad as f64 / cited.len() as f64
    };

    let score = Score::new(
        COVERAGE_WEIGHT * citation_coverage
            + COMPLETENESS_WEIGHT * role_completeness
            + CONSISTENCY_WEIGHT * (1.0 - contradiction_rate),
    );
    (
        score,
        ScoreBreakdown {
            citation_coverage,
            role_completeness,
            contradiction_rate,
        },
    )
}
