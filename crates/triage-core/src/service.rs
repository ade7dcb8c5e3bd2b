//! Ticket and directory services: the write paths that trigger pipelines.
//!
//! Both services persist first and publish the trigger event second, so a
//! lost event can never leave a phantom record. Publishing is best-effort
//! (see [`crate::bus::EventBus::publish`]); creation succeeds even when the
//! pipeline side is down.

use std::sync::Arc;

use tracing::info;
use triage_state::{DirectoryStore, Role, StorageError, Ticket, TicketStore, User, UserId};

use crate::bus::EventBus;
use crate::domain::TriggerEvent;

/// Errors from the service layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Files tickets and kicks off their processing pipeline.
pub struct TicketService {
    tickets: Arc<dyn TicketStore>,
    bus: EventBus,
}

impl TicketService {
    pub fn new(tickets: Arc<dyn TicketStore>, bus: EventBus) -> Self {
        Self { tickets, bus }
    }

    /// File a new ticket and publish its trigger event.
    ///
    /// The event publish never fails creation: the caller gets the
    /// persisted ticket back regardless.
    pub async fn create_ticket(
        &self,
        title: &str,
        description: &str,
        created_by: &UserId,
    ) -> Result<Ticket, ServiceError> {
        if title.trim().is_empty() || description.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "title and description are required".to_string(),
            ));
        }

        let ticket = Ticket::new(
            title.to_string(),
            description.to_string(),
            created_by.clone(),
        );
        self.tickets.insert(ticket.clone()).await?;
        info!(ticket_id = %ticket.id, "ticket created");

        self.bus.publish(TriggerEvent::ticket_created(&ticket));
        Ok(ticket)
    }
}

/// Registers users and keeps the directory current.
pub struct DirectoryService {
    directory: Arc<dyn DirectoryStore>,
    bus: EventBus,
}

impl DirectoryService {
    pub fn new(directory: Arc<dyn DirectoryStore>, bus: EventBus) -> Self {
        Self { directory, bus }
    }

    /// Register a new requester account and publish its signup event.
    pub async fn sign_up(&self, email: &str, skills: Vec<String>) -> Result<User, ServiceError> {
        self.create_user(email, Role::Requester, skills, true).await
    }

    /// Create a user with an explicit role. No signup event is published
    /// for operator-created accounts.
    pub async fn add_user(
        &self,
        email: &str,
        role: Role,
        skills: Vec<String>,
    ) -> Result<User, ServiceError> {
        self.create_user(email, role, skills, false).await
    }

    /// Bootstrap an admin account. Idempotent: an existing admin with the
    /// same email is returned as-is.
    pub async fn create_admin(&self, email: &str) -> Result<User, ServiceError> {
        if let Some(existing) = self.directory.find_by_email(email).await? {
            if existing.role == Role::Admin {
                return Ok(existing);
            }
            self.directory
                .update(email, Vec::new(), Some(Role::Admin))
                .await?;
            return self
                .directory
                .find_by_email(email)
                .await?
                .ok_or_else(|| {
                    ServiceError::Storage(StorageError::UserNotFound {
                        id: email.to_string(),
                    })
                });
        }
        self.create_user(email, Role::Admin, Vec::new(), false).await
    }

    async fn create_user(
        &self,
        email: &str,
        role: Role,
        skills: Vec<String>,
        announce: bool,
    ) -> Result<User, ServiceError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::InvalidInput(
                "a valid email is required".to_string(),
            ));
        }

        let user = User::new(email.to_string(), role, skills);
        self.directory.insert(user.clone()).await?;
        info!(user_id = %user.id, email = %user.email, role = ?user.role, "user created");

        if announce {
            self.bus.publish(TriggerEvent::user_signed_up(&user.email));
        }
        Ok(user)
    }
}
