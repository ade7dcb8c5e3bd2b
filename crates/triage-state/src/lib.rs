//! Triage-State: persistence layer for the Triage ticket system.
//!
//! This crate owns all I/O with the document store. It defines the three
//! storage abstractions the workflow layer depends on:
//!
//! - `TicketStore`: the mutable ticket documents (status, analysis, assignee)
//! - `DirectoryStore`: user accounts, roles, and skill tags
//! - `RunStore`: durable pipeline runs and their per-step log
//!
//! All traits are async and backend-agnostic. A SurrealDB implementation is
//! provided via [`SurrealStores`]; in-memory fakes for testing live in the
//! `fakes` module.

mod error;
pub mod fakes;
mod migrations;
mod records;
mod schema;
pub mod storage_traits;
mod surreal;

pub use error::{StateError, StorageError};
pub use records::{
    Priority, Role, RunId, RunRecord, RunState, StepEntry, StepStatus, Ticket, TicketAnalysis,
    TicketId, TicketStatus, User, UserId,
};
pub use storage_traits::{DirectoryStore, RunStore, StorageResult, TicketStore};
pub use surreal::SurrealStores;

/// Result type for triage-state operations
pub type Result<T> = std::result::Result<T, StateError>;
