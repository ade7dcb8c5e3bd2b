//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryTicketStore`, `MemoryDirectoryStore`, and
//! `MemoryRunStore` that satisfy the trait contracts without any external
//! dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::records::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryTicketStore
// ---------------------------------------------------------------------------

/// In-memory ticket store backed by a `Mutex<HashMap<id, Ticket>>`.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: Mutex<HashMap<String, Ticket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a ticket outright. Test helper for "ticket deleted under the
    /// pipeline's feet" scenarios.
    pub fn remove(&self, id: &TicketId) {
        self.tickets.lock().unwrap().remove(&id.0);
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn insert(&self, ticket: Ticket) -> StorageResult<()> {
        let mut tickets = self.tickets.lock().unwrap();
        tickets.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn get(&self, id: &TicketId) -> StorageResult<Ticket> {
        let tickets = self.tickets.lock().unwrap();
        tickets
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::TicketNotFound { id: id.0.clone() })
    }

    async fn set_status(&self, id: &TicketId, status: TicketStatus) -> StorageResult<()> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::TicketNotFound { id: id.0.clone() })?;
        // Monotonic clamp: never move backward.
        if status.rank() > ticket.status.rank() {
            ticket.status = status;
        }
        Ok(())
    }

    async fn apply_analysis(&self, id: &TicketId, analysis: &TicketAnalysis) -> StorageResult<()> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::TicketNotFound { id: id.0.clone() })?;
        ticket.priority = analysis.priority;
        ticket.note = analysis.note.clone();
        ticket.skills = analysis.skills.clone();
        if TicketStatus::InProgress.rank() > ticket.status.rank() {
            ticket.status = TicketStatus::InProgress;
        }
        Ok(())
    }

    async fn set_assignee(&self, id: &TicketId, assignee: Option<&UserId>) -> StorageResult<()> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::TicketNotFound { id: id.0.clone() })?;
        ticket.assignee = assignee.cloned();
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<Ticket>> {
        let tickets = self.tickets.lock().unwrap();
        let mut all: Vec<Ticket> = tickets.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// MemoryDirectoryStore
// ---------------------------------------------------------------------------

/// In-memory directory backed by a `Mutex<Vec<User>>`.
///
/// Insertion order doubles as creation order, which is what makes the
/// assignment policy's "first match wins" deterministic in tests.
#[derive(Debug, Default)]
pub struct MemoryDirectoryStore {
    users: Mutex<Vec<User>>,
}

impl MemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectoryStore {
    async fn insert(&self, user: User) -> StorageResult<()> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(StorageError::DuplicateEmail {
                email: user.email.clone(),
            });
        }
        users.push(user);
        Ok(())
    }

    async fn get(&self, id: &UserId) -> StorageResult<User> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.id == *id)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound { id: id.0.clone() })
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn users_by_role(&self, role: Role) -> StorageResult<Vec<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().filter(|u| u.role == role).cloned().collect())
    }

    async fn update(
        &self,
        email: &str,
        skills: Vec<String>,
        role: Option<Role>,
    ) -> StorageResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| StorageError::UserNotFound {
                id: email.to_string(),
            })?;
        if !skills.is_empty() {
            user.skills = skills;
        }
        if let Some(role) = role {
            user.role = role;
        }
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunEntry {
    record: RunRecord,
    steps: Vec<StepEntry>,
}

/// In-memory run store backed by a `Mutex<HashMap<run_id, RunEntry>>`.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_running<T>(
        &self,
        run_id: &RunId,
        f: impl FnOnce(&mut RunEntry) -> T,
    ) -> StorageResult<T> {
        let mut runs = self.runs.lock().unwrap();
        let entry = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        if entry.record.is_terminal() {
            return Err(StorageError::InvalidRunState {
                run_id: run_id.0.clone(),
                status: format!("{:?}", entry.record.state),
                expected: "Running".to_string(),
            });
        }
        Ok(f(entry))
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn find_or_create(
        &self,
        pipeline_id: &str,
        dedupe_key: &str,
        payload: &serde_json::Value,
    ) -> StorageResult<RunRecord> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(entry) = runs
            .values()
            .find(|e| e.record.pipeline_id == pipeline_id && e.record.dedupe_key == dedupe_key)
        {
            return Ok(entry.record.clone());
        }
        let record = RunRecord::new(
            pipeline_id.to_string(),
            dedupe_key.to_string(),
            payload.clone(),
        );
        runs.insert(
            record.run_id.0.clone(),
            RunEntry {
                record: record.clone(),
                steps: Vec::new(),
            },
        );
        Ok(record)
    }

    async fn get(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let runs = self.runs.lock().unwrap();
        runs.get(&run_id.0)
            .map(|e| e.record.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn bump_attempt(&self, run_id: &RunId) -> StorageResult<u32> {
        self.with_running(run_id, |entry| {
            entry.record.attempts += 1;
            entry.record.attempts
        })
    }

    async fn record_step(&self, run_id: &RunId, step: StepEntry) -> StorageResult<()> {
        self.with_running(run_id, |entry| {
            entry.steps.retain(|s| s.step != step.step);
            entry.steps.push(step);
        })
    }

    async fn steps(&self, run_id: &RunId) -> StorageResult<Vec<StepEntry>> {
        let runs = self.runs.lock().unwrap();
        let entry = runs
            .get(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        Ok(entry.steps.clone())
    }

    async fn complete(&self, run_id: &RunId, message: &str) -> StorageResult<()> {
        self.with_running(run_id, |entry| {
            entry.record.state = RunState::Succeeded;
            entry.record.message = Some(message.to_string());
            entry.record.completed_at = Some(Utc::now());
        })
    }

    async fn fail(&self, run_id: &RunId, message: &str) -> StorageResult<()> {
        self.with_running(run_id, |entry| {
            entry.record.state = RunState::Failed;
            entry.record.message = Some(message.to_string());
            entry.record.completed_at = Some(Utc::now());
        })
    }

    async fn list(&self) -> StorageResult<Vec<RunRecord>> {
        let runs = self.runs.lock().unwrap();
        let mut all: Vec<RunRecord> = runs.values().map(|e| e.record.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn ticket_status_never_regresses() {
        let store = MemoryTicketStore::new();
        let ticket = Ticket::new("t".into(), "d".into(), UserId::new());
        let id = ticket.id.clone();
        store.insert(ticket).await.unwrap();

        store
            .set_status(&id, TicketStatus::InProgress)
            .await
            .unwrap();
        store.set_status(&id, TicketStatus::Created).await.unwrap();

        let ticket = store.get(&id).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::InProgress);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let dir = MemoryDirectoryStore::new();
        dir.insert(User::new("a@x.io".into(), Role::Requester, vec![]))
            .await
            .unwrap();
        let err = dir
            .insert(User::new("a@x.io".into(), Role::Moderator, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEmail { .. }));
    }

    #[tokio::test]
    async fn users_by_role_preserves_insertion_order() {
        let dir = MemoryDirectoryStore::new();
        dir.insert(User::new("m1@x.io".into(), Role::Moderator, vec![]))
            .await
            .unwrap();
        dir.insert(User::new("m2@x.io".into(), Role::Moderator, vec![]))
            .await
            .unwrap();
        let mods = dir.users_by_role(Role::Moderator).await.unwrap();
        assert_eq!(mods[0].email, "m1@x.io");
        assert_eq!(mods[1].email, "m2@x.io");
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent_per_key() {
        let runs = MemoryRunStore::new();
        let a = runs
            .find_or_create("ticket/create", "k1", &json!({}))
            .await
            .unwrap();
        let b = runs
            .find_or_create("ticket/create", "k1", &json!({}))
            .await
            .unwrap();
        assert_eq!(a.run_id, b.run_id);

        let c = runs
            .find_or_create("ticket/create", "k2", &json!({}))
            .await
            .unwrap();
        assert_ne!(a.run_id, c.run_id);
    }

    #[tokio::test]
    async fn record_step_replaces_same_name() {
        let runs = MemoryRunStore::new();
        let run = runs
            .find_or_create("ticket/create", "k", &json!({}))
            .await
            .unwrap();

        runs.record_step(&run.run_id, StepEntry::failed("fetch-ticket", "boom"))
            .await
            .unwrap();
        runs.record_step(&run.run_id, StepEntry::succeeded("fetch-ticket", json!({"id": 1})))
            .await
            .unwrap();

        let steps = runs.steps(&run.run_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn terminal_run_rejects_further_writes() {
        let runs = MemoryRunStore::new();
        let run = runs
            .find_or_create("ticket/create", "k", &json!({}))
            .await
            .unwrap();
        runs.complete(&run.run_id, "done").await.unwrap();

        let err = runs.bump_attempt(&run.run_id).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRunState { .. }));
    }
}
