//! Structured observability hooks for the pipeline lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` helper
//! - Emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level (`warn!` for fatal run endings) and
//! are filtered through `RUST_LOG` like everything else.

use tracing::{info, warn};

use crate::domain::{BagStatus, RoleId, Stage};

/// Span constructor for a whole pipeline run.
///
/// Async code attaches it with `Instrument::instrument`; synchronous callers
/// can hold the guard returned by [`RunSpan::enter`].
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// The span all run-scoped events nest under.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("polysolve.run", run_id = %run_id)
    }

    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: Self::span(run_id).entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, session_id: Option<&str>) {
    info!(
        event = "run.started",
        run_id = %run_id,
        session_id = session_id.unwrap_or("-"),
    );
}

pub fn emit_stage_entered(stage: Stage) {
    info!(event = "stage.entered", stage = %stage);
}

/// Emit event: one role's evidence bag is complete.
pub fn emit_role_collected(role_id: RoleId, status: BagStatus, claims: usize) {
    info!(
        event = "role.collected",
        role_id = %role_id,
        status = %status,
        claims = claims,
    );
}

pub fn emit_fact_check_finished(supported: usize, contradicted: usize, inconclusive: usize, lookups: u32) {
    info!(
        event = "factcheck.finished",
        supported = supported,
        contradicted = contradicted,
        inconclusive = inconclusive,
        lookups = lookups,
    );
}

/// Emit event: a refinement iteration produced a scored candidate.
pub fn emit_refinement_iteration(iteration: u32, score: f64, best: f64) {
    info!(
        event = "refinement.iteration",
        iteration = iteration,
        score = score,
        best = best,
    );
}

pub fn emit_run_finished(run_id: &str, stage: Stage, duration_ms: u64, diagnostics: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        diagnostics = diagnostics,
    );
}

/// Emit event: the run ended in `Failed` (warning level).
pub fn emit_run_fatal(run_id: &str, stage: Stage, error: &dyn std::fmt::Display) {
    warn!(event = "run.fatal", run_id = %run_id, stage = %stage, error = %error);
}
