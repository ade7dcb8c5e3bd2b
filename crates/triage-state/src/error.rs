//! Error types for triage-state

use thiserror::Error;

/// Errors that can occur while setting up the persistence backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors surfaced by the storage traits
#[derive(Error, Debug)]
pub enum StorageError {
    /// Ticket does not exist
    #[error("ticket not found: {id}")]
    TicketNotFound { id: String },

    /// User does not exist
    #[error("user not found: {id}")]
    UserNotFound { id: String },

    /// Run does not exist
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Email already registered in the directory
    #[error("email already registered: {email}")]
    DuplicateEmail { email: String },

    /// Run is not in the state the operation requires
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// Payload could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Backend-specific failure (connection drop, malformed row, ...)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this error means the referenced entity is permanently absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::TicketNotFound { .. }
                | StorageError::UserNotFound { .. }
                | StorageError::RunNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
