//! Storage trait definitions for Triage
//!
//! These traits define the storage abstractions the workflow layer is
//! written against:
//! - `TicketStore`: ticket documents and their mutable fields
//! - `DirectoryStore`: user accounts and skill tags
//! - `RunStore`: durable pipeline runs with a per-step log
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::records::{
    Role, RunId, RunRecord, StepEntry, Ticket, TicketAnalysis, TicketId, TicketStatus, User,
    UserId,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Ticket document store.
///
/// Guarantees:
/// - `set_status` never moves a ticket backward in its lifecycle; a
///   regression or repeat is a silent no-op (idempotent).
/// - Field writes are last-write-wins; no cross-document locking.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket.
    async fn insert(&self, ticket: Ticket) -> StorageResult<()>;

    /// Load a ticket by id. Returns `StorageError::TicketNotFound` if absent.
    async fn get(&self, id: &TicketId) -> StorageResult<Ticket>;

    /// Advance the ticket's status. Clamped to never regress.
    async fn set_status(&self, id: &TicketId, status: TicketStatus) -> StorageResult<()>;

    /// Write classification output (priority, note, skills) in one update
    /// and advance the status to IN_PROGRESS.
    async fn apply_analysis(&self, id: &TicketId, analysis: &TicketAnalysis) -> StorageResult<()>;

    /// Persist the chosen assignee (or clear it with `None`).
    async fn set_assignee(&self, id: &TicketId, assignee: Option<&UserId>) -> StorageResult<()>;

    /// List all tickets, newest first.
    async fn list(&self) -> StorageResult<Vec<Ticket>>;
}

/// Directory of user accounts.
///
/// Guarantees:
/// - Emails are unique; inserting a duplicate fails with `DuplicateEmail`.
/// - `users_by_role` returns entries in creation order. The assignment
///   policy treats that order as authoritative ("first match wins").
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Persist a new user. Fails on duplicate email.
    async fn insert(&self, user: User) -> StorageResult<()>;

    /// Load a user by id. Returns `StorageError::UserNotFound` if absent.
    async fn get(&self, id: &UserId) -> StorageResult<User>;

    /// Look up a user by email.
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// All users with the given role, in creation order.
    async fn users_by_role(&self, role: Role) -> StorageResult<Vec<User>>;

    /// Update a user's skills and/or role by email. Empty skills are
    /// ignored (the existing set is kept).
    async fn update(
        &self,
        email: &str,
        skills: Vec<String>,
        role: Option<Role>,
    ) -> StorageResult<()>;

    /// List all users in creation order.
    async fn list(&self) -> StorageResult<Vec<User>>;
}

/// Durable workflow-run store.
///
/// Guarantees:
/// - Runs are unique per `(pipeline_id, dedupe_key)`; `find_or_create`
///   returns the existing run for a repeated key.
/// - At most one entry exists per step name; recording a step replaces any
///   previous entry under that name.
/// - A run transitions Running → Succeeded | Failed (terminal). Terminal
///   runs reject further step records and attempt bumps.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Find the run for `(pipeline_id, dedupe_key)` or create a fresh one.
    async fn find_or_create(
        &self,
        pipeline_id: &str,
        dedupe_key: &str,
        payload: &serde_json::Value,
    ) -> StorageResult<RunRecord>;

    /// Retrieve a run record by ID.
    async fn get(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Increment the attempt counter and return the new attempt number.
    async fn bump_attempt(&self, run_id: &RunId) -> StorageResult<u32>;

    /// Durably record a step outcome. Replaces an existing entry for the
    /// same step name.
    async fn record_step(&self, run_id: &RunId, entry: StepEntry) -> StorageResult<()>;

    /// All step entries for a run, in recording order.
    async fn steps(&self, run_id: &RunId) -> StorageResult<Vec<StepEntry>>;

    /// Mark a run as succeeded with an outcome message.
    async fn complete(&self, run_id: &RunId, message: &str) -> StorageResult<()>;

    /// Mark a run as failed with an outcome message.
    async fn fail(&self, run_id: &RunId, message: &str) -> StorageResult<()>;

    /// List all runs, newest first.
    async fn list(&self) -> StorageResult<Vec<RunRecord>>;
}
