//! Observability tests for the pipeline run lifecycle.
//!
//! These tests verify that structured tracing events are emitted for the key
//! lifecycle points: run start, stage transitions, per-role collection,
//! refinement iterations and run end.

use std::sync::Arc;

use polysolve_core::capability::fakes::{source, ScriptedGenerator, ScriptedSearch};
use polysolve_core::obs::{
    emit_fact_check_finished, emit_refinement_iteration, emit_role_collected, emit_run_fatal,
    emit_run_finished, emit_run_started, emit_stage_entered, RunSpan,
};
use polysolve_core::pipeline::{ROLE_IDENTIFICATION_TASK, SYNTHESIS_TASK};
use polysolve_core::{
    run_pipeline, BagStatus, PipelineConfig, PipelineError, ProblemStatement, RoleId, RunState,
    Stage,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_logs_run_and_session() {
    emit_run_started("run-123", Some("session-a"));
    assert!(logs_contain("run.started"));
    assert!(logs_contain("session-a"));
}

#[traced_test]
#[test]
fn test_emit_stage_entered_logs_stage_name() {
    emit_stage_entered(Stage::FactCheck);
    assert!(logs_contain("stage.entered"));
}

#[traced_test]
#[test]
fn test_emit_role_collected_logs_status() {
    emit_role_collected(RoleId(2), BagStatus::Degraded, 3);
    assert!(logs_contain("role.collected"));
}

#[traced_test]
#[test]
fn test_emit_fact_check_and_refinement_events() {
    emit_fact_check_finished(4, 1, 2, 2);
    emit_refinement_iteration(2, 0.65, 0.7);
    assert!(logs_contain("factcheck.finished"));
    assert!(logs_contain("refinement.iteration"));
}

/// Fatal endings are logged at warn level.
#[traced_test]
#[test]
fn test_emit_run_fatal_logs_warning() {
    let err = PipelineError::InvalidProblem("problem text is empty".to_string());
    emit_run_fatal("run-err-001", Stage::Intake, &err);
    emit_run_finished("run-err-001", Stage::Failed, 12, 1);
    assert!(logs_contain("WARN"));
    assert!(logs_contain("run.fatal"));
    assert!(logs_contain("run.finished"));
}

#[traced_test]
#[test]
fn test_run_span_enter_creates_span() {
    let span = RunSpan::enter("test-span-run");
    emit_stage_entered(Stage::Intake);
    drop(span);
    assert!(logs_contain("test-span-run"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_completed_run_emits_lifecycle_events() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .respond_to(ROLE_IDENTIFICATION_TASK, "- Hydrologist: storm surge modelling")
            .respond_to(SYNTHESIS_TASK, "## Plan\nRaise the levees, says the hydrologist."),
    );
    let search = Arc::new(
        ScriptedSearch::new().otherwise(vec![source("https://h", "Surges reach four metres.")]),
    );

    let result = run_pipeline(
        ProblemStatement::new("Plan flood defences"),
        generator,
        search,
        PipelineConfig::default(),
    )
    .await;

    assert_eq!(result.state, RunState::Done);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("stage.entered"));
    assert!(logs_contain("role.collected"));
    assert!(logs_contain("factcheck.finished"));
    assert!(logs_contain("refinement.iteration"));
    assert!(logs_contain("run.finished"));
    assert!(!logs_contain("run.fatal"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_failed_run_emits_fatal_event() {
    let result = run_pipeline(
        ProblemStatement::new("   "),
        Arc::new(ScriptedGenerator::new()),
        Arc::new(ScriptedSearch::new()),
        PipelineConfig::default(),
    )
    .await;

    assert_eq!(result.state, RunState::Failed);
    assert!(logs_contain("run.fatal"));
    assert!(logs_contain("run.finished"));
}
