//! Per-role evidence collection.
//!
//! One tokio task per role issues that role's research queries against the
//! search capability and turns the hits into attributed claims. A task never
//! fails: errors are folded into the bag's status so sibling roles are
//! unaffected. Reports are pushed into a shared sink that the aggregator
//! drains once every task has been joined. The tasks live in a `JoinSet`,
//! so dropping the fan-out aborts whatever is still running.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info_span, warn, Instrument};

use crate::capability::{call_with_retry, CancelSignal, CapabilityError, SearchProvider};
use crate::config::PipelineConfig;
use crate::domain::{BagStatus, Claim, ClaimId, EvidenceBag, Role, RoleId, Source};
use crate::obs;

use super::prompts::ResearchPrompt;

/// Claim text is cut at this many characters.
const MAX_CLAIM_CHARS: usize = 300;

/// Work order for one role's collector task.
#[derive(Debug, Clone)]
pub struct CollectorTask {
    pub role: Role,
    pub prompt: ResearchPrompt,
    /// Queries issued in order; the first is the research prompt itself.
    pub queries: Vec<String>,
}

/// What a collector task hands to the aggregator.
#[derive(Debug, Clone)]
pub struct CollectorReport {
    pub bag: EvidenceBag,
    /// Errors of the queries that failed after retries.
    pub errors: Vec<CapabilityError>,
}

impl CollectorReport {
    pub fn was_cancelled(&self) -> bool {
        self.errors.contains(&CapabilityError::Cancelled)
    }
}

/// Spawned collector tasks plus the sink they report into.
pub struct CollectorFanOut {
    pub(crate) tasks: JoinSet<()>,
    pub(crate) sink: Arc<Mutex<Vec<CollectorReport>>>,
}

impl CollectorFanOut {
    /// Tasks not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Spawn one collector task per role.
///
/// Tasks run concurrently and share nothing but the read-only config, the
/// search capability and the cancellation signal.
pub fn spawn_collectors(
    tasks: Vec<CollectorTask>,
    search: Arc<dyn SearchProvider>,
    config: Arc<PipelineConfig>,
    cancel: CancelSignal,
) -> CollectorFanOut {
    let sink: Arc<Mutex<Vec<CollectorReport>>> = Arc::new(Mutex::new(Vec::new()));
    let mut join_set = JoinSet::new();

    for task in tasks {
        let role_id = task.role.id;
        let search = Arc::clone(&search);
        let config = Arc::clone(&config);
        let cancel = cancel.clone();
        let sink = Arc::clone(&sink);
        let span = info_span!("collector", role_id = %role_id, role = %task.role.name);

        join_set.spawn(
            async move {
                let report = collect_role(&task, search.as_ref(), &config, &cancel).await;
                obs::emit_role_collected(role_id, report.bag.status, report.bag.claims.len());
                sink.lock().await.push(report);
            }
            .instrument(span),
        );
    }

    CollectorFanOut {
        tasks: join_set,
        sink,
    }
}

/// Run one role's queries in order and build its evidence bag.
///
/// Status is `Ok` when every query answered, `Degraded` when some failed but
/// claims were still found, `Failed` otherwise. Cancellation stops further
/// queries.
pub async fn collect_role(
    task: &CollectorTask,
    search: &dyn SearchProvider,
    config: &PipelineConfig,
    cancel: &CancelSignal,
) -> CollectorReport {
    let role_id = task.role.id;
    let mut claims = Vec::new();
    let mut errors = Vec::new();
    let mut failures = Vec::new();
    let mut seen_uris = HashSet::new();
    let mut next_seq = 1u32;

    for (n, query) in task.queries.iter().enumerate() {
        let operation = format!("search:{role_id}:q{}", n + 1);
        match call_with_retry(&config.retry, cancel, &operation, || search.search(query)).await {
            Ok(hits) => {
                let found = claims_from_hits(
                    role_id,
                    &hits,
                    config.max_claims_per_query,
                    &mut next_seq,
                    &mut seen_uris,
                );
                debug!(query = n + 1, hits = hits.len(), claims = found.len(), "query answered");
                claims.extend(found);
            }
            Err(e) => {
                warn!(query = n + 1, error = %e, "research query failed");
                failures.push(format!("query {}: {e}", n + 1));
                let cancelled = e == CapabilityError::Cancelled;
                errors.push(e);
                if cancelled {
                    break;
                }
            }
        }
    }

    let status = match (errors.is_empty(), claims.is_empty()) {
        (true, _) => BagStatus::Ok,
        (false, false) => BagStatus::Degraded,
        (false, true) => BagStatus::Failed,
    };
    let diagnostic = (!failures.is_empty()).then(|| failures.join("; "));

    CollectorReport {
        bag: EvidenceBag {
            role_id,
            claims,
            status,
            diagnostic,
        },
        errors,
    }
}

/// Turn search hits into claims attributed to `role_id`.
///
/// Hits without a snippet, and hits whose URI this role already cited, are
/// skipped. Confidence decays with rank: `0.9 - 0.1 * rank`, floored at 0.3.
pub fn claims_from_hits(
    role_id: RoleId,
    hits: &[Source],
    max_claims: usize,
    next_seq: &mut u32,
    seen_uris: &mut HashSet<String>,
) -> Vec<Claim> {
    let mut claims = Vec::new();
    for (rank, hit) in hits.iter().enumerate() {
        if claims.len() >= max_claims {
            break;
        }
        let text = first_sentence(&hit.snippet);
        if text.is_empty() || !seen_uris.insert(hit.uri.clone()) {
            continue;
        }
        let confidence = (0.9 - 0.1 * rank as f64).max(0.3);
        claims.push(Claim::new(
            ClaimId::new(role_id, *next_seq),
            text,
            vec![hit.clone()],
            confidence,
        ));
        *next_seq += 1;
    }
    claims
}

/// First sentence of `snippet`, whitespace-collapsed and length-capped.
pub(crate) fn first_sentence(snippet: &str) -> String {
    let collapsed = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    let end = collapsed
        .char_indices()
        .zip(collapsed.chars().skip(1))
        .find(|((_, c), next)| matches!(c, '.' | '!' | '?') && *next == ' ')
        .map(|((i, c), _)| i + c.len_utf8())
        .unwrap_or(collapsed.len());
    collapsed[..end].chars().take(MAX_CLAIM_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::fakes::{source, ScriptedSearch};
    use crate::capability::RetryPolicy;
    use crate::domain::ProblemStatement;
    use crate::pipeline::prompts::{generate_research_prompt, research_queries};

    fn task(name: &str) -> CollectorTask {
        let role = Role::new(RoleId(1), name, "because");
        let problem = ProblemStatement::new("Cut battery costs");
        let prompt = generate_research_prompt(&role, &problem);
        let queries = research_queries(&role, &prompt, &problem, 2);
        CollectorTask {
            role,
            prompt,
            queries,
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::default().with_retry(RetryPolicy {
            timeout_ms: 1_000,
            max_retries: 1,
            backoff_base_ms: 10,
        })
    }

    #[test]
    fn test_first_sentence_stops_at_terminal_punctuation() {
        assert_eq!(
            first_sentence("Costs fell 89%.  Prices rose in 2022."),
            "Costs fell 89%."
        );
        assert_eq!(first_sentence("Version 2.0 shipped"), "Version 2.0 shipped");
        assert_eq!(first_sentence("   "), "");
    }

    #[test]
    fn test_claims_from_hits_skips_blank_and_repeated_sources() {
        let hits = vec![
            source("https://a", "Solid-state cells are denser. More text."),
            source("https://b", "  "),
            source("https://a", "Duplicate uri."),
            source("https://c", "Recycling recovers lithium."),
        ];
        let mut seq = 1;
        let mut seen = HashSet::new();
        let claims = claims_from_hits(RoleId(2), &hits, 5, &mut seq, &mut seen);
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].id.to_string(), "R2-C1");
        assert_eq!(claims[0].text, "Solid-state cells are denser.");
        assert!((claims[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(claims[1].id.to_string(), "R2-C2");
        assert!((claims[1].confidence - 0.6).abs() < 1e-9);
        assert_eq!(seq, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_role_all_queries_ok() {
        let search = ScriptedSearch::new().otherwise(vec![source("https://x", "A fact.")]);
        let report = collect_role(&task("Chemist"), &search, &fast_config(), &CancelSignal::never()).await;
        assert_eq!(report.bag.status, BagStatus::Ok);
        // Second query returns the same URI, which is deduplicated.
        assert_eq!(report.bag.claims.len(), 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_role_partial_failure_is_degraded() {
        let search = ScriptedSearch::new()
            .fail_for("Chemist: ", CapabilityError::Failed("quota".into()))
            .otherwise(vec![source("https://x", "A fact.")]);
        let report = collect_role(&task("Chemist"), &search, &fast_config(), &CancelSignal::never()).await;
        assert_eq!(report.bag.status, BagStatus::Degraded);
        assert_eq!(report.bag.claims.len(), 1);
        assert!(report.bag.diagnostic.as_deref().unwrap_or("").contains("quota"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_role_total_failure_is_failed() {
        let search = ScriptedSearch::new().fail_for("", CapabilityError::Transient("503".into()));
        let report = collect_role(&task("Chemist"), &search, &fast_config(), &CancelSignal::never()).await;
        assert_eq!(report.bag.status, BagStatus::Failed);
        assert!(report.bag.claims.is_empty());
        assert_eq!(report.errors.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_role_stops_when_cancelled() {
        let (handle, signal) = crate::capability::cancel_pair();
        handle.cancel();
        let search = ScriptedSearch::new().otherwise(vec![source("https://x", "A fact.")]);
        let report = collect_role(&task("Chemist"), &search, &fast_config(), &signal).await;
        assert_eq!(report.bag.status, BagStatus::Failed);
        assert!(report.was_cancelled());
        assert_eq!(report.errors.len(), 1);
        assert!(search.queries().is_empty());
    }
}
