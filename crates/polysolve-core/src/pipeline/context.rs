//! Per-run controller state.

use tokio::time::Instant;

use crate::domain::{Diagnostic, Stage};
use crate::obs;

/// Mutable bookkeeping owned by the controller for one run.
///
/// Stage outputs are passed between stages by value; this only tracks where
/// the run is and what has been recorded so far.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub session_id: Option<String>,
    started: Instant,
    stage: Stage,
    trace: Vec<Stage>,
    diagnostics: Vec<Diagnostic>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id,
            started: Instant::now(),
            stage: Stage::Intake,
            trace: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Move to `stage` and record it in the trace.
    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.trace.push(stage);
        obs::emit_stage_entered(stage);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn trace(&self) -> &[Stage] {
        &self.trace
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Consume the context into `(trace, diagnostics)`.
    pub fn into_parts(self) -> (Vec<Stage>, Vec<Diagnostic>) {
        (self.trace, self.diagnostics)
    }
}
