//! Step-level error taxonomy for the workflow engine.
//!
//! Two classes matter to the retry policy:
//! - `NotFound`: the referenced entity is permanently absent. Retrying can
//!   never succeed, so the engine fails the run immediately.
//! - `Transient`: network trouble, timeouts, store unavailability. Retried
//!   until the run's attempt budget is exhausted.

use triage_state::StorageError;

/// A failure raised by a pipeline step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Non-retriable: the referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Retriable: expected to succeed on a later attempt.
    #[error("{0}")]
    Transient(String),
}

impl StepError {
    /// Shorthand for a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        StepError::Transient(message.into())
    }

    /// Whether the engine should spend retry budget on this failure.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }
}

impl From<StorageError> for StepError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TicketNotFound { id } => StepError::NotFound {
                entity: "ticket",
                id,
            },
            StorageError::UserNotFound { id } => StepError::NotFound { entity: "user", id },
            StorageError::RunNotFound { run_id } => StepError::NotFound {
                entity: "run",
                id: run_id,
            },
            other => StepError::Transient(other.to_string()),
        }
    }
}

/// Result type for pipeline steps.
pub type StepResult<T> = std::result::Result<T, StepError>;
