//! SurrealDB-backed implementation of the Triage storage traits
//!
//! One [`SurrealStores`] handle implements `TicketStore`, `DirectoryStore`,
//! and `RunStore` against the same connection, converting between the
//! `schema` row types and the `records` types at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::records::*;
use crate::schema::{
    priority_str, role_str, status_str, RunRow, StepRow, TicketRow, UserRow,
};
use crate::storage_traits::*;

/// SurrealDB-backed stores for tickets, users, and workflow runs.
#[derive(Clone)]
pub struct SurrealStores {
    db: Surreal<Any>,
}

impl SurrealStores {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `triage/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        db.use_ns("triage")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealStores connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Honors `SURREALDB_URL`; without it, falls back to local persistence
    /// in `.triage/db` via surrealkv.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let db = surrealdb::engine::any::connect(&url)
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;

            db.use_ns("triage")
                .use_db("main")
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            info!("SurrealStores connected ({})", url);
            return Ok(Self { db });
        }

        // Default to local persistence in .triage/db
        let path = ".triage/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        let url = format!("surrealkv://{}", path);
        info!(
            "No SURREALDB_URL found, using local persistence: {}",
            url
        );

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("triage")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_ticket(&self, tid: &str) -> StorageResult<TicketRow> {
        let tid_owned = tid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM tickets WHERE ticket_id = $tid")
            .bind(("tid", tid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<TicketRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::TicketNotFound { id: tid.to_string() })
    }

    async fn fetch_run(&self, rid: &str) -> StorageResult<RunRow> {
        let rid_owned = rid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM runs WHERE run_id = $rid")
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<RunRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: rid.to_string(),
            })
    }

    /// Fetch a run row and verify it is in "running" state.
    async fn fetch_running(&self, rid: &str) -> StorageResult<RunRow> {
        let row = self.fetch_run(rid).await?;
        if row.state != "running" {
            return Err(StorageError::InvalidRunState {
                run_id: rid.to_string(),
                status: row.state,
                expected: "Running".to_string(),
            });
        }
        Ok(row)
    }

    async fn finish_run(&self, run_id: &RunId, state: &str, message: &str) -> StorageResult<()> {
        self.fetch_running(&run_id.0).await?;

        let rid_owned = run_id.0.clone();
        let state_owned = state.to_string();
        let message_owned = message.to_string();

        self.db
            .query(
                "UPDATE runs SET state = $state, message = $message, \
                 completed_at = time::now() WHERE run_id = $rid",
            )
            .bind(("state", state_owned))
            .bind(("message", message_owned))
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl TicketStore for SurrealStores {
    async fn insert(&self, ticket: Ticket) -> StorageResult<()> {
        let row = TicketRow::from_ticket(&ticket);
        debug!(ticket_id = %ticket.id, "creating ticket");

        let _created: Option<TicketRow> = self
            .db
            .create("tickets")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &TicketId) -> StorageResult<Ticket> {
        let row = self.fetch_ticket(&id.0).await?;
        row.into_ticket().map_err(StorageError::Backend)
    }

    async fn set_status(&self, id: &TicketId, status: TicketStatus) -> StorageResult<()> {
        let row = self.fetch_ticket(&id.0).await?;
        let current =
            crate::schema::parse_status(&row.status).map_err(StorageError::Backend)?;
        // Monotonic clamp: never move backward.
        if status.rank() <= current.rank() {
            return Ok(());
        }

        let tid_owned = id.0.clone();
        let status_owned = status_str(status).to_string();
        self.db
            .query("UPDATE tickets SET status = $status WHERE ticket_id = $tid")
            .bind(("status", status_owned))
            .bind(("tid", tid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn apply_analysis(&self, id: &TicketId, analysis: &TicketAnalysis) -> StorageResult<()> {
        let row = self.fetch_ticket(&id.0).await?;
        let current =
            crate::schema::parse_status(&row.status).map_err(StorageError::Backend)?;
        let status = if TicketStatus::InProgress.rank() > current.rank() {
            status_str(TicketStatus::InProgress)
        } else {
            &row.status
        };

        let tid_owned = id.0.clone();
        let status_owned = status.to_string();
        let priority_owned = analysis.priority.map(|p| priority_str(p).to_string());
        let note_owned = analysis.note.clone();
        let skills_owned = analysis.skills.clone();

        self.db
            .query(
                "UPDATE tickets SET priority = $priority, note = $note, \
                 skills = $skills, status = $status WHERE ticket_id = $tid",
            )
            .bind(("priority", priority_owned))
            .bind(("note", note_owned))
            .bind(("skills", skills_owned))
            .bind(("status", status_owned))
            .bind(("tid", tid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn set_assignee(&self, id: &TicketId, assignee: Option<&UserId>) -> StorageResult<()> {
        self.fetch_ticket(&id.0).await?;

        let tid_owned = id.0.clone();
        let assignee_owned = assignee.map(|a| a.0.clone());
        self.db
            .query("UPDATE tickets SET assignee = $assignee WHERE ticket_id = $tid")
            .bind(("assignee", assignee_owned))
            .bind(("tid", tid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<Ticket>> {
        let mut res = self
            .db
            .query("SELECT * FROM tickets ORDER BY created_at DESC")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<TicketRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.into_ticket().map_err(StorageError::Backend))
            .collect()
    }
}

#[async_trait]
impl DirectoryStore for SurrealStores {
    async fn insert(&self, user: User) -> StorageResult<()> {
        if self.find_by_email(&user.email).await?.is_some() {
            return Err(StorageError::DuplicateEmail {
                email: user.email.clone(),
            });
        }

        let row = UserRow::from_user(&user);
        debug!(user_id = %user.id, email = %user.email, "creating user");

        let _created: Option<UserRow> = self
            .db
            .create("users")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &UserId) -> StorageResult<User> {
        let uid_owned = id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM users WHERE user_id = $uid")
            .bind(("uid", uid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<UserRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::UserNotFound { id: id.0.clone() })?
            .into_user()
            .map_err(StorageError::Backend)
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let email_owned = email.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM users WHERE email = $email")
            .bind(("email", email_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<UserRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(|r| r.into_user().map_err(StorageError::Backend))
            .transpose()
    }

    async fn users_by_role(&self, role: Role) -> StorageResult<Vec<User>> {
        let role_owned = role_str(role).to_string();
        let mut res = self
            .db
            .query(
                "SELECT * FROM users WHERE role = $role \
                 ORDER BY created_at ASC, user_id ASC",
            )
            .bind(("role", role_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<UserRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.into_user().map_err(StorageError::Backend))
            .collect()
    }

    async fn update(
        &self,
        email: &str,
        skills: Vec<String>,
        role: Option<Role>,
    ) -> StorageResult<()> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| StorageError::UserNotFound {
                id: email.to_string(),
            })?;

        let skills_owned = if skills.is_empty() {
            user.skills
        } else {
            skills
        };
        let role_owned = role_str(role.unwrap_or(user.role)).to_string();
        let email_owned = email.to_string();

        self.db
            .query("UPDATE users SET skills = $skills, role = $role WHERE email = $email")
            .bind(("skills", skills_owned))
            .bind(("role", role_owned))
            .bind(("email", email_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<User>> {
        let mut res = self
            .db
            .query("SELECT * FROM users ORDER BY created_at ASC, user_id ASC")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<UserRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.into_user().map_err(StorageError::Backend))
            .collect()
    }
}

#[async_trait]
impl RunStore for SurrealStores {
    async fn find_or_create(
        &self,
        pipeline_id: &str,
        dedupe_key: &str,
        payload: &serde_json::Value,
    ) -> StorageResult<RunRecord> {
        let pid_owned = pipeline_id.to_string();
        let key_owned = dedupe_key.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM runs WHERE pipeline_id = $pid AND dedupe_key = $key")
            .bind(("pid", pid_owned))
            .bind(("key", key_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<RunRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if let Some(row) = rows.into_iter().next() {
            return row.into_record().map_err(StorageError::Backend);
        }

        let record = RunRecord::new(
            pipeline_id.to_string(),
            dedupe_key.to_string(),
            payload.clone(),
        );
        debug!(run_id = %record.run_id, pipeline_id, "creating run");

        let _created: Option<RunRow> = self
            .db
            .create("runs")
            .content(RunRow::from_record(&record))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(record)
    }

    async fn get(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let row = self.fetch_run(&run_id.0).await?;
        row.into_record().map_err(StorageError::Backend)
    }

    async fn bump_attempt(&self, run_id: &RunId) -> StorageResult<u32> {
        let row = self.fetch_running(&run_id.0).await?;
        let attempts = row.attempts + 1;

        let rid_owned = run_id.0.clone();
        self.db
            .query("UPDATE runs SET attempts = $attempts WHERE run_id = $rid")
            .bind(("attempts", attempts))
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(attempts)
    }

    async fn record_step(&self, run_id: &RunId, entry: StepEntry) -> StorageResult<()> {
        self.fetch_running(&run_id.0).await?;

        // Replace any previous entry under the same step name.
        let rid_owned = run_id.0.clone();
        let step_owned = entry.step.clone();
        self.db
            .query("DELETE run_steps WHERE run_id = $rid AND step = $step")
            .bind(("rid", rid_owned))
            .bind(("step", step_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = StepRow::from_entry(run_id, &entry);
        let _created: Option<StepRow> = self
            .db
            .create("run_steps")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn steps(&self, run_id: &RunId) -> StorageResult<Vec<StepEntry>> {
        // Verify run exists
        self.fetch_run(&run_id.0).await?;

        let rid_owned = run_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM run_steps WHERE run_id = $rid ORDER BY recorded_at ASC")
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<StepRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.into_entry().map_err(StorageError::Backend))
            .collect()
    }

    async fn complete(&self, run_id: &RunId, message: &str) -> StorageResult<()> {
        self.finish_run(run_id, "succeeded", message).await
    }

    async fn fail(&self, run_id: &RunId, message: &str) -> StorageResult<()> {
        self.finish_run(run_id, "failed", message).await
    }

    async fn list(&self) -> StorageResult<Vec<RunRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM runs ORDER BY created_at DESC")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<RunRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|r| r.into_record().map_err(StorageError::Backend))
            .collect()
    }
}
