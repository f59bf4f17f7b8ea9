//! Pipeline controller: sequences the stages and owns the run's state.
//!
//! `Intake → RoleIdentification → PromptGeneration → EvidenceCollection →
//! Aggregation → FactCheck → Refinement → Formatting → Done`, with `Failed`
//! reachable from any non-terminal stage. Every path ends in a
//! [`SolveResult`]; internal errors become diagnostics on it. Formatting
//! also attaches the scenario review and the ranked candidates.

use std::sync::Arc;
use std::time::Duration;

use polysolve_state::{validate_session_id, SessionSnapshot, SessionStore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::capability::{cancel_pair, CancelHandle, CancelSignal, SearchProvider, TextGenerator};
use crate::config::PipelineConfig;
use crate::domain::{
    ClaimConflict, Diagnostic, DiagnosticKind, FactCheckResult, PipelineError, ProblemStatement,
    RankedOption, Role, RoleStatusSummary, RunState, ScenarioAssessment, Solution, SolveResult,
    Stage,
};
use crate::obs::{self, RunSpan};

use super::aggregator::aggregate;
use super::assessment::{assess_scenario, rank_options, AssessmentInput};
use super::collector::{spawn_collectors, CollectorTask};
use super::context::RunContext;
use super::fact_check::fact_check;
use super::formatter::{format_solution, role_summaries, FormatInput, Formatted};
use super::prompts::{generate_research_prompt, research_queries};
use super::refiner::{fallback_candidate, refine, RefinementInput};
use super::roles::identify_roles;

/// Longest session summary stored for reuse as context.
const MAX_SUMMARY_CHARS: usize = 2_000;

/// The assembled pipeline: capabilities, optional session store, config.
#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn SearchProvider>,
    sessions: Option<Arc<dyn SessionStore>>,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator,
            search,
            sessions: None,
            config: Arc::new(config),
        }
    }

    /// Attach a session store for cross-run continuity.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run. Never fails: fatal conditions yield a `Failed`
    /// result carrying diagnostics.
    pub async fn run(&self, problem: ProblemStatement) -> SolveResult {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::span(&run_id);
        self.execute(problem, run_id).instrument(span).await
    }

    async fn execute(&self, problem: ProblemStatement, run_id: String) -> SolveResult {
        let mut ctx = RunContext::new(run_id, problem.session_id().map(str::to_string));
        obs::emit_run_started(&ctx.run_id, problem.session_id());
        ctx.enter(Stage::Intake);

        if let Err(e) = self.config.validate().and_then(|()| problem.validate()) {
            return fail(ctx, &problem, e, Vec::new());
        }

        let (cancel_handle, cancel) = cancel_pair();
        let deadline = Instant::now() + Duration::from_millis(self.config.run_deadline_ms);
        let _watchdog = Watchdog::arm(deadline, cancel_handle);

        let prior_context = self.load_prior_context(&problem, &mut ctx, &cancel).await;
        let result = self
            .run_stages(&mut ctx, &problem, prior_context.as_deref(), deadline, cancel.clone())
            .await;

        let mut result = match result {
            Ok(done) => done.into_result(ctx, &problem),
            Err((e, roles)) => return fail(ctx, &problem, e, roles),
        };
        self.save_snapshot(&mut result, &cancel).await;
        result
    }

    async fn run_stages(
        &self,
        ctx: &mut RunContext,
        problem: &ProblemStatement,
        prior_context: Option<&str>,
        deadline: Instant,
        cancel: CancelSignal,
    ) -> Result<Completed, (PipelineError, Vec<RoleStatusSummary>)> {
        let config = &*self.config;

        ctx.enter(Stage::RoleIdentification);
        let identified =
            identify_roles(self.generator.as_ref(), problem, prior_context, config, &cancel).await;
        ctx.extend(identified.diagnostics);
        let roles: Vec<Role> = identified.roles;
        if roles.is_empty() {
            return Err((PipelineError::NoRoles, Vec::new()));
        }

        ctx.enter(Stage::PromptGeneration);
        let tasks: Vec<CollectorTask> = roles
            .iter()
            .map(|role| {
                let prompt = generate_research_prompt(role, problem);
                let queries = research_queries(role, &prompt, problem, config.queries_per_role);
                CollectorTask {
                    role: role.clone(),
                    prompt,
                    queries,
                }
            })
            .collect();

        ctx.enter(Stage::EvidenceCollection);
        let fan_out = spawn_collectors(
            tasks,
            Arc::clone(&self.search),
            Arc::clone(&self.config),
            cancel.clone(),
        );

        ctx.enter(Stage::Aggregation);
        let aggregation = aggregate(&roles, fan_out).await;
        ctx.extend(aggregation.diagnostics.iter().cloned());
        let evidence = aggregation.evidence;
        if evidence.all_failed() {
            let summaries = role_summaries(&roles, &evidence, &FactCheckResult::default());
            return Err((
                PipelineError::AllEvidenceFailed { roles: roles.len() },
                summaries,
            ));
        }

        ctx.enter(Stage::FactCheck);
        let checked = fact_check(&evidence, self.search.as_ref(), config, &cancel).await;
        ctx.extend(checked.diagnostics);
        let fact_check_result = checked.result;

        ctx.enter(Stage::Refinement);
        let input = RefinementInput {
            problem,
            roles: &roles,
            evidence: &evidence,
            fact_check: &fact_check_result,
            prior_context,
        };
        let refined = refine(input, self.generator.as_ref(), config, deadline, &cancel).await;
        ctx.extend(refined.diagnostics);
        let candidate = match refined.best {
            Some(best) => best,
            None => {
                ctx.record(Diagnostic::warning(
                    DiagnosticKind::FallbackCandidate,
                    Stage::Refinement,
                    "refinement produced no candidate; presenting the evidence digest",
                ));
                fallback_candidate(problem, &roles, &evidence, &fact_check_result)
            }
        };

        ctx.enter(Stage::Formatting);
        let formatted = format_solution(FormatInput {
            candidate: &candidate,
            roles: &roles,
            evidence: &evidence,
            fact_check: &fact_check_result,
            iterations_used: refined.iterations_used,
            converged: refined.converged,
        })
        .map_err(|e| {
            let summaries = role_summaries(&roles, &evidence, &fact_check_result);
            (e, summaries)
        })?;
        ctx.extend(formatted.diagnostics.iter().cloned());

        let review = AssessmentInput {
            accepted: &candidate,
            candidates: &refined.candidates,
            roles: &roles,
            evidence: &evidence,
            fact_check: &fact_check_result,
            converged: refined.converged,
        };
        let assessment = assess_scenario(review);
        let options = rank_options(review);

        ctx.enter(Stage::Done);
        Ok(Completed {
            formatted,
            conflicts: fact_check_result.conflicts,
            assessment,
            options,
        })
    }

    async fn load_prior_context(
        &self,
        problem: &ProblemStatement,
        ctx: &mut RunContext,
        cancel: &CancelSignal,
    ) -> Option<String> {
        let store = self.sessions.as_ref()?;
        let session_id = problem.session_id()?;
        if let Err(e) = validate_session_id(session_id) {
            ctx.record(Diagnostic::warning(
                DiagnosticKind::SessionStoreError,
                Stage::Intake,
                format!("session ignored: {e}"),
            ));
            return None;
        }
        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = store.get(session_id) => Some(r),
        };
        let Some(lookup) = lookup else {
            warn!(session_id, "session lookup abandoned at the run deadline");
            ctx.record(Diagnostic::warning(
                DiagnosticKind::Cancelled,
                Stage::Intake,
                "session lookup cut short by the run deadline",
            ));
            return None;
        };
        match lookup {
            Ok(Some(snapshot)) => Some(format!(
                "Earlier in this session the problem was \"{}\". Accepted solution summary:\n{}",
                snapshot.problem, snapshot.summary
            )),
            Ok(None) => None,
            Err(e) => {
                warn!(session_id, error = %e, "session lookup failed");
                ctx.record(Diagnostic::warning(
                    DiagnosticKind::SessionStoreError,
                    Stage::Intake,
                    format!("session lookup failed: {e}"),
                ));
                None
            }
        }
    }

    async fn save_snapshot(&self, result: &mut SolveResult, cancel: &CancelSignal) {
        let (Some(store), Some(session_id)) = (self.sessions.as_ref(), result.session_id.clone())
        else {
            return;
        };
        if validate_session_id(&session_id).is_err() {
            return;
        }
        let summary: String = result.solution_text().chars().take(MAX_SUMMARY_CHARS).collect();
        let snapshot = SessionSnapshot::new(
            session_id.as_str(),
            result.run_id.as_str(),
            result.problem.as_str(),
            summary,
            result.content_digest(),
        );
        let saved = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = store.put(snapshot) => Some(r),
        };
        match saved {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "session save failed");
                result.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::SessionStoreError,
                    Stage::Done,
                    format!("session save failed: {e}"),
                ));
            }
            None => {
                warn!(session_id = %session_id, "session save abandoned at the run deadline");
                result.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::Cancelled,
                    Stage::Done,
                    "session snapshot not saved: run deadline reached",
                ));
            }
        }
    }
}

/// Fires the run's cancellation signal at the deadline. The timer task is
/// aborted when the guard drops, so it never outlives the run.
struct Watchdog(JoinHandle<()>);

impl Watchdog {
    fn arm(deadline: Instant, handle: CancelHandle) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            debug!("run deadline reached; cancelling outstanding work");
            handle.cancel();
        }))
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Stage outputs of a successful run.
struct Completed {
    formatted: Formatted,
    conflicts: Vec<ClaimConflict>,
    assessment: ScenarioAssessment,
    options: Vec<RankedOption>,
}

impl Completed {
    fn into_result(self, ctx: RunContext, problem: &ProblemStatement) -> SolveResult {
        let run_id = ctx.run_id.clone();
        let session_id = ctx.session_id.clone();
        let elapsed = ctx.elapsed_ms();
        let (stage_trace, diagnostics) = ctx.into_parts();
        obs::emit_run_finished(&run_id, Stage::Done, elapsed, diagnostics.len());
        SolveResult {
            run_id,
            session_id,
            problem: problem.text().to_string(),
            state: RunState::Done,
            solution: self.formatted.solution,
            citations: self.formatted.citations,
            roles: self.formatted.roles,
            conflicts: self.conflicts,
            assessment: Some(self.assessment),
            options: self.options,
            stage_trace,
            diagnostics,
        }
    }
}

/// Close the run as `Failed` with the fatal error recorded.
fn fail(
    mut ctx: RunContext,
    problem: &ProblemStatement,
    error: PipelineError,
    roles: Vec<RoleStatusSummary>,
) -> SolveResult {
    let stage = ctx.stage();
    obs::emit_run_fatal(&ctx.run_id, stage, &error);
    ctx.record(Diagnostic::fatal(error.diagnostic_kind(), stage, error.to_string()));
    ctx.enter(Stage::Failed);

    let run_id = ctx.run_id.clone();
    let session_id = ctx.session_id.clone();
    let elapsed = ctx.elapsed_ms();
    let (stage_trace, diagnostics) = ctx.into_parts();
    obs::emit_run_finished(&run_id, Stage::Failed, elapsed, diagnostics.len());
    SolveResult {
        run_id,
        session_id,
        problem: problem.text().to_string(),
        state: RunState::Failed,
        solution: Solution::default(),
        citations: Vec::new(),
        roles,
        conflicts: Vec::new(),
        assessment: None,
        options: Vec::new(),
        stage_trace,
        diagnostics,
    }
}

/// Run the full pipeline once with the given capabilities.
pub async fn run_pipeline(
    problem: ProblemStatement,
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn SearchProvider>,
    config: PipelineConfig,
) -> SolveResult {
    Pipeline::new(generator, search, config).run(problem).await
}
