//! Trigger events: the messages that start pipeline runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use triage_state::{Ticket, TicketId};

/// Event name emitted when a ticket is filed.
pub const TICKET_CREATED: &str = "ticket/create";

/// Event name emitted when a user signs up.
pub const USER_SIGNED_UP: &str = "user/signup";

/// A trigger event, carrying the id of the entity to process.
///
/// The payload is kept as JSON: runs persist it verbatim and each pipeline
/// reads only the fields it needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerEvent {
    pub name: String,
    pub data: serde_json::Value,
}

impl TriggerEvent {
    /// Event fired when a new ticket is persisted.
    pub fn ticket_created(ticket: &Ticket) -> Self {
        Self {
            name: TICKET_CREATED.to_string(),
            data: serde_json::json!({
                "ticketId": ticket.id.0,
                "title": ticket.title,
                "description": ticket.description,
                "createdBy": ticket.created_by.0,
            }),
        }
    }

    /// Event fired when a new user registers.
    pub fn user_signed_up(email: &str) -> Self {
        Self {
            name: USER_SIGNED_UP.to_string(),
            data: serde_json::json!({ "email": email }),
        }
    }

    /// Idempotency key: SHA-256 over the event name and the canonical
    /// (key-sorted) JSON payload. Re-publishing an identical event resumes
    /// the same run; distinct entities never collide.
    pub fn dedupe_key(&self) -> String {
        let canonical = if let Some(obj) = self.data.as_object() {
            // Force BTreeMap sorting even if preserve_order is enabled
            let sorted: std::collections::BTreeMap<_, _> = obj.iter().collect();
            serde_json::to_vec(&sorted).unwrap_or_default()
        } else {
            serde_json::to_vec(&self.data).unwrap_or_default()
        };

        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    /// The ticket id carried by a `ticket/create` event, if present.
    pub fn ticket_id(&self) -> Option<TicketId> {
        self.data["ticketId"]
            .as_str()
            .map(|s| TicketId(s.to_string()))
    }

    /// The email carried by a `user/signup` event, if present.
    pub fn email(&self) -> Option<&str> {
        self.data["email"].as_str()
    }
}
