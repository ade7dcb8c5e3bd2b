//! Domain types shared across the workflow layer.

mod error;
mod event;

pub use error::{StepError, StepResult};
pub use event::{TriggerEvent, TICKET_CREATED, USER_SIGNED_UP};

use serde::{Deserialize, Serialize};

/// Terminal outcome of a pipeline run, surfaced to the caller for logging.
///
/// The engine never re-raises step failures; every dispatch ends in one of
/// these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub message: String,
}

impl RunOutcome {
    /// Successful terminal outcome.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed terminal outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        let ok = RunOutcome::success("ticket processed");
        assert!(ok.success);
        assert_eq!(ok.message, "ticket processed");

        let err = RunOutcome::failure("retries exhausted");
        assert!(!err.success);
    }
}
