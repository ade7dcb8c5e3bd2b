//! Triage Pipelines
//!
//! The concrete workflows dispatched by the engine: the ticket pipeline
//! (fetch, classify, apply, assign, notify) and the signup pipeline
//! (welcome mail). Both are plain [`triage_core::Pipeline`] implementations
//! over injected stores and capabilities.

pub mod assign;
pub mod signup;
pub mod ticket;

pub use assign::select_assignee;
pub use signup::SignupPipeline;
pub use ticket::{normalize_priority, TicketPipeline};
