//! End-to-end pipeline runs against scripted capabilities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use polysolve_core::capability::fakes::{source, ScriptedGenerator, ScriptedSearch};
use polysolve_core::pipeline::{FALLBACK_ROLE_NAME, ROLE_IDENTIFICATION_TASK, SYNTHESIS_TASK};
use polysolve_core::{
    run_pipeline, BagStatus, CapabilityError, CapabilityResult, DiagnosticKind, Pipeline,
    PipelineConfig, ProblemStatement, RetryPolicy, RiskLevel, RunState, SearchProvider, Severity,
    SolveResult, Source, Stage, TextGenerator, Verdict,
};
use polysolve_state::fakes::{MemorySessionStore, UnavailableSessionStore};
use polysolve_state::{SessionSnapshot, SessionStore, StateResult};
use tokio::time::Instant;

const PROBLEM: &str = "How can we reduce the cost of electric vehicle batteries?";

const ROLES_JSON: &str = r#"[
  {"name": "Battery Chemist", "rationale": "Cell chemistry sets material cost"},
  {"name": "Supply Chain Analyst", "rationale": "Raw material sourcing drives price swings"}
]"#;

const SOLUTION: &str = "Cheaper chemistries are the main lever [R1-C1].\n\n\
## Chemistry\n\
Sodium-ion cells avoid lithium entirely [R1-C1] and LFP cells avoid cobalt [R1-C2].\n\n\
## Outlook\n\
Pack prices keep falling as manufacturing scales.\n";

fn fast_config() -> PipelineConfig {
    PipelineConfig::default().with_retry(RetryPolicy {
        timeout_ms: 5_000,
        max_retries: 1,
        backoff_base_ms: 50,
    })
}

fn chemist_hits() -> Vec<Source> {
    vec![
        source(
            "https://example.org/sodium-ion",
            "Sodium-ion cells avoid lithium entirely. They trade some energy density.",
        ),
        source(
            "https://example.org/lfp",
            "LFP cathodes avoid cobalt and nickel.",
        ),
    ]
}

fn generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .respond_to(ROLE_IDENTIFICATION_TASK, ROLES_JSON)
        .respond_to(SYNTHESIS_TASK, SOLUTION)
}

/// Chemist research succeeds; every supply-chain query fails.
fn partially_failing_search() -> ScriptedSearch {
    ScriptedSearch::new()
        .fail_for(
            "Supply Chain Analyst",
            CapabilityError::Failed("provider rejected query".into()),
        )
        .hits_for("Battery Chemist", chemist_hits())
}

async fn run_with(
    generator: ScriptedGenerator,
    search: ScriptedSearch,
    config: PipelineConfig,
) -> SolveResult {
    run_pipeline(
        ProblemStatement::new(PROBLEM),
        Arc::new(generator),
        Arc::new(search),
        config,
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn ev_battery_run_completes_with_one_failed_role() {
    let result = run_with(generator(), partially_failing_search(), fast_config()).await;

    assert_eq!(result.state, RunState::Done);
    assert_eq!(result.roles.len(), 2);
    let degraded = result.degraded_roles();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].name, "Supply Chain Analyst");
    assert_eq!(degraded[0].status, BagStatus::Failed);
    assert_eq!(result.roles[0].status, BagStatus::Ok);
    assert!(result.has_diagnostic(DiagnosticKind::EvidenceFailed));
    assert!(result.fatal_diagnostic().is_none());

    assert!(!result.solution.is_empty());
    assert_eq!(result.solution.sections[0].heading, "Summary");
    assert_eq!(result.solution.iterations_used, 1);
    assert!(result.solution.converged);
    assert_eq!(result.citations.len(), 2);
    assert_eq!(result.citations[0].role_name, "Battery Chemist");
    assert_eq!(
        result.citations[0].sources[0].uri,
        "https://example.org/sodium-ion"
    );
    assert!(result.solution_text().contains("[1]"));
    assert!(!result.solution_text().contains("[R1-C1]"));

    let assessment = result.assessment.as_ref().expect("assessment");
    assert!(assessment
        .weaknesses
        .iter()
        .any(|w| w == "No evidence from the Supply Chain Analyst"));
    assert_eq!(assessment.highest_risk(), Some(RiskLevel::Low));
    assert_eq!(result.options.len(), 1);
    assert_eq!(result.options[0].rank, 1);
    assert!(result.options[0].accepted);
    assert_eq!(result.options[0].title, "Cheaper chemistries are the main lever");
    let markdown = result.to_markdown();
    assert!(markdown.contains("## Risk Assessment"));
    assert!(markdown.contains("| 1 | Cheaper chemistries are the main lever (accepted) |"));

    assert_eq!(
        result.stage_trace,
        vec![
            Stage::Intake,
            Stage::RoleIdentification,
            Stage::PromptGeneration,
            Stage::EvidenceCollection,
            Stage::Aggregation,
            Stage::FactCheck,
            Stage::Refinement,
            Stage::Formatting,
            Stage::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn all_roles_failing_ends_in_failed_with_empty_solution() {
    let generator = Arc::new(generator());
    let search = ScriptedSearch::new().fail_for("", CapabilityError::Transient("503".into()));

    let result = run_pipeline(
        ProblemStatement::new(PROBLEM),
        generator.clone(),
        Arc::new(search),
        fast_config(),
    )
    .await;

    assert_eq!(result.state, RunState::Failed);
    assert!(result.solution.is_empty());
    assert!(result.citations.is_empty());
    let fatal = result.fatal_diagnostic().expect("fatal diagnostic");
    assert_eq!(fatal.kind, DiagnosticKind::AllEvidenceFailed);
    assert_eq!(fatal.stage, Stage::Aggregation);
    assert_eq!(result.stage_trace.last(), Some(&Stage::Failed));
    assert_eq!(result.roles.len(), 2);
    assert!(result.roles.iter().all(|r| r.status == BagStatus::Failed));
    // Refinement never ran.
    assert!(generator.calls().iter().all(|p| !p.contains(SYNTHESIS_TASK)));
    assert!(result.assessment.is_none());
    assert!(result.options.is_empty());
}

#[tokio::test(start_paused = true)]
async fn identical_inputs_produce_identical_content() {
    let first = run_with(generator(), partially_failing_search(), fast_config()).await;
    let second = run_with(generator(), partially_failing_search(), fast_config()).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.content_digest(), second.content_digest());
    assert_eq!(first.solution, second.solution);
    assert_eq!(first.solution.iterations_used, second.solution.iterations_used);
}

#[tokio::test(start_paused = true)]
async fn role_generation_failure_falls_back_to_generalist() {
    let generator = ScriptedGenerator::new()
        .fail_on(ROLE_IDENTIFICATION_TASK, CapabilityError::Failed("bad request".into()))
        .respond_to(SYNTHESIS_TASK, "A generalist answer [R1-C1].");
    let search = ScriptedSearch::new().otherwise(vec![source(
        "https://example.org/overview",
        "Battery pack prices fell sharply over the last decade.",
    )]);

    let result = run_with(generator, search, fast_config()).await;

    assert_eq!(result.state, RunState::Done);
    assert_eq!(result.roles.len(), 1);
    assert_eq!(result.roles[0].name, FALLBACK_ROLE_NAME);
    assert!(result.has_diagnostic(DiagnosticKind::RoleIdentificationEmpty));
    assert!(result.has_diagnostic(DiagnosticKind::CapabilityError));
}

#[tokio::test(start_paused = true)]
async fn deadline_returns_best_effort_result() {
    let search = ScriptedSearch::new()
        .delay_for("Supply Chain Analyst", Duration::from_secs(60))
        .hits_for("Supply Chain Analyst", vec![])
        .hits_for("Battery Chemist", chemist_hits());
    let config = fast_config().with_deadline_ms(1_000).with_retry(RetryPolicy {
        timeout_ms: 120_000,
        max_retries: 0,
        backoff_base_ms: 10,
    });
    let generator = Arc::new(generator());

    let result = run_pipeline(
        ProblemStatement::new(PROBLEM),
        generator.clone(),
        Arc::new(search),
        config,
    )
    .await;

    assert_eq!(result.state, RunState::Done);
    assert!(result.has_diagnostic(DiagnosticKind::Cancelled));
    assert!(result.has_diagnostic(DiagnosticKind::RefinementTimeout));
    assert!(result.has_diagnostic(DiagnosticKind::FallbackCandidate));
    assert_eq!(result.solution.iterations_used, 0);
    assert!(!result.solution.is_empty());
    assert_eq!(result.roles[1].status, BagStatus::Failed);
    assert!(generator.calls().iter().all(|p| !p.contains(SYNTHESIS_TASK)));

    // The evidence digest is the only option and is flagged as a risk.
    assert_eq!(result.options.len(), 1);
    assert_eq!(result.options[0].iteration, 0);
    assert!(result.options[0].accepted);
    let assessment = result.assessment.as_ref().expect("assessment");
    assert!(assessment.risks.iter().any(|r| r.level == RiskLevel::Medium));
}

#[tokio::test(start_paused = true)]
async fn cross_role_contradiction_is_reported() {
    let generator = ScriptedGenerator::new()
        .respond_to(ROLE_IDENTIFICATION_TASK, ROLES_JSON)
        .respond_to(
            SYNTHESIS_TASK,
            "Recycling matters [R1-C1].\n## Supply\nSourcing is volatile [R2-C1].",
        );
    let search = ScriptedSearch::new()
        .hits_for(
            "Battery Chemist",
            vec![source(
                "https://example.org/recycling-a",
                "Battery recycling reduces lithium demand.",
            )],
        )
        .hits_for(
            "Supply Chain Analyst",
            vec![source(
                "https://example.org/recycling-b",
                "Battery recycling does not reduce lithium demand.",
            )],
        );

    // Citing only contradicted claims caps the score at 0.8.
    let result = run_with(generator, search, fast_config().with_quality_threshold(0.9)).await;

    assert_eq!(result.state, RunState::Done);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.roles[0].contradicted, 1);
    assert!(result
        .citations
        .iter()
        .all(|c| c.verdict == Verdict::Contradicted));
    let breakdown = result.solution.breakdown.as_ref().expect("breakdown");
    assert_eq!(breakdown.contradiction_rate, 1.0);
    assert!(!result.solution.converged);
    assert_eq!(result.solution.iterations_used, 4);
}

#[tokio::test(start_paused = true)]
async fn blank_problem_fails_at_intake() {
    let result = run_pipeline(
        ProblemStatement::new("   "),
        Arc::new(generator()),
        Arc::new(ScriptedSearch::new()),
        fast_config(),
    )
    .await;

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.stage_trace, vec![Stage::Intake, Stage::Failed]);
    let fatal = result.fatal_diagnostic().expect("fatal diagnostic");
    assert_eq!(fatal.kind, DiagnosticKind::InvalidProblem);
    assert_eq!(fatal.severity, Severity::Fatal);
}

/// Records the context passed alongside each prompt.
struct ContextRecorder {
    inner: ScriptedGenerator,
    contexts: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl TextGenerator for ContextRecorder {
    async fn generate(&self, prompt: &str, context: Option<&str>) -> CapabilityResult<String> {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(context.map(str::to_string));
        }
        self.inner.generate(prompt, context).await
    }
}

#[tokio::test(start_paused = true)]
async fn session_snapshot_feeds_the_next_run() {
    let store = Arc::new(MemorySessionStore::new());

    let first = Pipeline::new(
        Arc::new(generator()),
        Arc::new(partially_failing_search()),
        fast_config(),
    )
    .with_session_store(store.clone())
    .run(ProblemStatement::new(PROBLEM).with_session("ev-session"))
    .await;
    assert_eq!(first.state, RunState::Done);
    assert_eq!(store.len(), 1);

    let snapshot = store
        .get("ev-session")
        .await
        .expect("store get")
        .expect("snapshot saved");
    assert_eq!(snapshot.run_id, first.run_id);
    assert_eq!(snapshot.content_digest, first.content_digest());
    assert!(snapshot.summary.contains("Sodium-ion"));

    let recorder = Arc::new(ContextRecorder {
        inner: generator(),
        contexts: Mutex::new(Vec::new()),
    });
    let second = Pipeline::new(
        recorder.clone(),
        Arc::new(partially_failing_search()),
        fast_config(),
    )
    .with_session_store(store.clone())
    .run(ProblemStatement::new("And what about charging costs?").with_session("ev-session"))
    .await;

    assert_eq!(second.state, RunState::Done);
    let contexts = recorder.contexts.lock().expect("contexts").clone();
    assert!(!contexts.is_empty());
    assert!(contexts
        .iter()
        .all(|c| c.as_deref().is_some_and(|c| c.contains(PROBLEM))));
    let latest = store.get("ev-session").await.expect("get").expect("snapshot");
    assert_eq!(latest.run_id, second.run_id);
}

#[tokio::test(start_paused = true)]
async fn unavailable_session_store_is_not_fatal() {
    let result = Pipeline::new(
        Arc::new(generator()),
        Arc::new(partially_failing_search()),
        fast_config(),
    )
    .with_session_store(Arc::new(UnavailableSessionStore))
    .run(ProblemStatement::new(PROBLEM).with_session("s-1"))
    .await;

    assert_eq!(result.state, RunState::Done);
    let store_errors = result
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::SessionStoreError)
        .count();
    assert_eq!(store_errors, 2);
}

/// A session store whose calls never complete, optionally answering `get`.
struct StalledSessionStore {
    answers_get: bool,
}

#[async_trait]
impl SessionStore for StalledSessionStore {
    async fn get(&self, _session_id: &str) -> StateResult<Option<SessionSnapshot>> {
        if self.answers_get {
            return Ok(None);
        }
        std::future::pending().await
    }

    async fn put(&self, _snapshot: SessionSnapshot) -> StateResult<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_session_lookup_is_bounded_by_the_deadline() {
    let pipeline = Pipeline::new(
        Arc::new(generator()),
        Arc::new(partially_failing_search()),
        fast_config().with_deadline_ms(1_000),
    )
    .with_session_store(Arc::new(StalledSessionStore { answers_get: false }));

    let started = Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(3_600),
        pipeline.run(ProblemStatement::new(PROBLEM).with_session("s-1")),
    )
    .await
    .expect("run returns once its deadline passes");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::Cancelled && d.stage == Stage::Intake));
    // Everything after intake ran on an already-cancelled signal.
    assert_eq!(result.state, RunState::Failed);
}

#[tokio::test(start_paused = true)]
async fn stalled_session_save_keeps_the_result() {
    let pipeline = Pipeline::new(
        Arc::new(generator()),
        Arc::new(partially_failing_search()),
        fast_config().with_deadline_ms(5_000),
    )
    .with_session_store(Arc::new(StalledSessionStore { answers_get: true }));

    let result = tokio::time::timeout(
        Duration::from_secs(3_600),
        pipeline.run(ProblemStatement::new(PROBLEM).with_session("s-1")),
    )
    .await
    .expect("run returns once its deadline passes");

    assert_eq!(result.state, RunState::Done);
    assert!(!result.solution.is_empty());
    let last = result.diagnostics.last().expect("save diagnostic");
    assert_eq!(last.kind, DiagnosticKind::Cancelled);
    assert_eq!(last.stage, Stage::Done);
}

/// Counts search calls that were dropped before answering.
struct StalledSearch {
    abandoned: Arc<AtomicUsize>,
}

struct AbandonedCall(Arc<AtomicUsize>);

impl Drop for AbandonedCall {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchProvider for StalledSearch {
    async fn search(&self, _query: &str) -> CapabilityResult<Vec<Source>> {
        let _call = AbandonedCall(Arc::clone(&self.abandoned));
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn dropping_a_run_aborts_its_collectors() {
    let abandoned = Arc::new(AtomicUsize::new(0));
    let config = fast_config()
        .with_deadline_ms(3_600_000)
        .with_retry(RetryPolicy {
            timeout_ms: 600_000,
            max_retries: 0,
            backoff_base_ms: 10,
        });
    let pipeline = Pipeline::new(
        Arc::new(generator()),
        Arc::new(StalledSearch {
            abandoned: Arc::clone(&abandoned),
        }),
        config,
    );

    let run = pipeline.run(ProblemStatement::new(PROBLEM));
    assert!(tokio::time::timeout(Duration::from_secs(1), run).await.is_err());

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    // One in-flight query per role, dropped when its task was aborted.
    assert_eq!(abandoned.load(Ordering::SeqCst), 2);
}
