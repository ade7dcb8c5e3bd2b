//! Triage Core Library
//!
//! The asynchronous heart of the ticket system: the durable workflow engine
//! (per-step memoization, bounded retry, idempotent resumption), the
//! injected capabilities it drives (classifier, notifier), the in-process
//! event bus, and the services that file tickets and register users.

pub mod bus;
pub mod classify;
pub mod domain;
pub mod engine;
pub mod notify;
pub mod obs;
pub mod service;
pub mod telemetry;

pub use bus::EventBus;
pub use classify::{
    classifier_from_env, Classifier, ClassifierError, HttpClassifier, KeywordClassifier,
    TicketSuggestion,
};
pub use domain::{RunOutcome, StepError, TriggerEvent, TICKET_CREATED, USER_SIGNED_UP};
pub use engine::{Pipeline, StepContext, WorkflowEngine, DEFAULT_MAX_ATTEMPTS};
pub use notify::{
    notifier_from_env, send_best_effort, HttpNotifier, LogNotifier, Notifier, NotifyError,
};
pub use obs::{
    emit_run_finished, emit_run_started, emit_step_completed, emit_step_failed,
    emit_step_replayed, RunSpan,
};
pub use service::{DirectoryService, ServiceError, TicketService};
pub use telemetry::init_tracing;

/// Triage version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
