//! Structured observability hooks for run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: start, step replay,
//!   step completion/failure, finish
//!
//! Events are emitted at `info!` level; step failures at `warn!`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // Now all tracing calls are automatically associated with run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("triage.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started (or resumed) for a pipeline.
pub fn emit_run_started(run_id: &str, pipeline_id: &str, attempt: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        pipeline_id = %pipeline_id,
        attempt = attempt,
    );
}

/// Emit event: run reached a terminal state.
pub fn emit_run_finished(run_id: &str, attempts: u32, success: bool, message: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        attempts = attempts,
        success = success,
        message = %message,
    );
}

/// Emit event: a memoized step replayed its stored result.
pub fn emit_step_replayed(run_id: &str, step: &str) {
    info!(event = "run.step_replayed", run_id = %run_id, step = %step);
}

/// Emit event: a step executed and its result was durably recorded.
pub fn emit_step_completed(run_id: &str, step: &str) {
    info!(event = "run.step_completed", run_id = %run_id, step = %step);
}

/// Emit event: a step failed (warning level).
pub fn emit_step_failed(run_id: &str, step: &str, error: &dyn std::fmt::Display, retriable: bool) {
    warn!(
        event = "run.step_failed",
        run_id = %run_id,
        step = %step,
        error = %error,
        retriable = retriable,
    );
}
