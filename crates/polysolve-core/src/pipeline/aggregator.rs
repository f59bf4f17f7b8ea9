//! Fan-in barrier for evidence collection.

use tracing::{instrument, warn};

use crate::domain::{
    BagStatus, Diagnostic, DiagnosticKind, EvidenceBag, EvidenceSet, Role, Stage,
};

use super::collector::{CollectorFanOut, CollectorReport};

/// Merged evidence plus per-role diagnostics.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub evidence: EvidenceSet,
    pub diagnostics: Vec<Diagnostic>,
}

impl Aggregation {
    /// `true` when every role failed and the run cannot continue.
    pub fn all_failed(&self) -> bool {
        self.evidence.all_failed()
    }
}

/// Wait for every collector task, then merge their reports in role order.
///
/// Nothing is read from the sink until all tasks have been joined, so the
/// merged set never observes a partially written bag. A task that ended
/// without reporting (panic or abort) yields a `Failed` bag for its role.
#[instrument(skip_all, fields(roles = roles.len()))]
pub async fn aggregate(roles: &[Role], fan_out: CollectorFanOut) -> Aggregation {
    let CollectorFanOut { mut tasks, sink } = fan_out;

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "collector task did not complete");
        }
    }

    let reports = std::mem::take(&mut *sink.lock().await);
    merge_reports(roles, reports)
}

/// Order `reports` by `roles`, filling gaps with failed bags, and derive the
/// per-role diagnostics.
pub fn merge_reports(roles: &[Role], mut reports: Vec<CollectorReport>) -> Aggregation {
    let mut bags = Vec::with_capacity(roles.len());
    let mut diagnostics = Vec::new();

    for role in roles {
        let report = match reports.iter().position(|r| r.bag.role_id == role.id) {
            Some(idx) => reports.swap_remove(idx),
            None => CollectorReport {
                bag: EvidenceBag::failed(role.id, "collector task ended without a report"),
                errors: Vec::new(),
            },
        };

        let detail = report.bag.diagnostic.clone().unwrap_or_default();
        match report.bag.status {
            BagStatus::Ok => {}
            BagStatus::Degraded => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::EvidenceDegraded,
                    Stage::EvidenceCollection,
                    format!("partial evidence for {}: {detail}", role.name),
                )
                .for_role(role.id),
            ),
            BagStatus::Failed => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::EvidenceFailed,
                    Stage::EvidenceCollection,
                    format!("no evidence for {}: {detail}", role.name),
                )
                .for_role(role.id),
            ),
        }
        if report.was_cancelled() {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::Cancelled,
                    Stage::EvidenceCollection,
                    "evidence collection cut short by the run deadline",
                )
                .for_role(role.id),
            );
        }

        let mut bag = report.bag;
        bag.claims.retain(|c| c.role_id == role.id);
        bags.push(bag);
    }

    Aggregation {
        evidence: EvidenceSet::from_bags(bags),
        diagnostics,
    }
}
