//! Schema definitions for Triage SurrealDB tables
//!
//! Tables:
//! - tickets: support ticket documents
//! - users: directory entries (accounts + skill tags)
//! - runs: workflow runs keyed by (pipeline_id, dedupe_key)
//! - run_steps: per-run step log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::records::{
    Priority, Role, RunId, RunRecord, RunState, StepEntry, StepStatus, Ticket, TicketId,
    TicketStatus, User, UserId,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Ticket row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Unique ticket ID (UUID string)
    pub ticket_id: String,
    pub title: String,
    pub description: String,
    /// Status: "CREATED" | "IN_PROGRESS" | "RESOLVED"
    pub status: String,
    /// Priority: "low" | "medium" | "high" (absent until classified)
    pub priority: Option<String>,
    pub note: Option<String>,
    pub skills: Vec<String>,
    /// Assigned user ID (UUID string)
    pub assignee: Option<String>,
    pub created_by: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl TicketRow {
    pub fn from_ticket(ticket: &Ticket) -> Self {
        TicketRow {
            id: None,
            ticket_id: ticket.id.0.clone(),
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: status_str(ticket.status).to_string(),
            priority: ticket.priority.map(|p| priority_str(p).to_string()),
            note: ticket.note.clone(),
            skills: ticket.skills.clone(),
            assignee: ticket.assignee.as_ref().map(|a| a.0.clone()),
            created_by: ticket.created_by.0.clone(),
            created_at: ticket.created_at,
        }
    }

    pub fn into_ticket(self) -> Result<Ticket, String> {
        Ok(Ticket {
            id: TicketId(self.ticket_id),
            title: self.title,
            description: self.description,
            status: parse_status(&self.status)?,
            priority: self
                .priority
                .as_deref()
                .map(|p| Priority::from_token(p).ok_or_else(|| format!("unknown priority: {p}")))
                .transpose()?,
            note: self.note,
            skills: self.skills,
            assignee: self.assignee.map(UserId),
            created_by: UserId(self.created_by),
            created_at: self.created_at,
        })
    }
}

/// User row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Unique user ID (UUID string)
    pub user_id: String,
    pub email: String,
    /// Role: "requester" | "moderator" | "admin"
    pub role: String,
    pub skills: Vec<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn from_user(user: &User) -> Self {
        UserRow {
            id: None,
            user_id: user.id.0.clone(),
            email: user.email.clone(),
            role: role_str(user.role).to_string(),
            skills: user.skills.clone(),
            created_at: user.created_at,
        }
    }

    pub fn into_user(self) -> Result<User, String> {
        Ok(User {
            id: UserId(self.user_id),
            email: self.email,
            role: parse_role(&self.role)?,
            skills: self.skills,
            created_at: self.created_at,
        })
    }
}

/// Run row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Unique run ID (UUID string)
    pub run_id: String,
    pub pipeline_id: String,
    pub dedupe_key: String,
    pub payload: serde_json::Value,
    /// State: "running" | "succeeded" | "failed"
    pub state: String,
    pub attempts: u32,
    pub message: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRow {
    pub fn from_record(record: &RunRecord) -> Self {
        RunRow {
            id: None,
            run_id: record.run_id.0.clone(),
            pipeline_id: record.pipeline_id.clone(),
            dedupe_key: record.dedupe_key.clone(),
            payload: record.payload.clone(),
            state: run_state_str(record.state).to_string(),
            attempts: record.attempts,
            message: record.message.clone(),
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }

    pub fn into_record(self) -> Result<RunRecord, String> {
        Ok(RunRecord {
            run_id: RunId(self.run_id),
            pipeline_id: self.pipeline_id,
            dedupe_key: self.dedupe_key,
            payload: self.payload,
            state: parse_run_state(&self.state)?,
            attempts: self.attempts,
            message: self.message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// Step log row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Owning run ID (UUID string)
    pub run_id: String,
    pub step: String,
    /// Status: "succeeded" | "failed"
    pub status: String,
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl StepRow {
    pub fn from_entry(run_id: &RunId, entry: &StepEntry) -> Self {
        StepRow {
            id: None,
            run_id: run_id.0.clone(),
            step: entry.step.clone(),
            status: match entry.status {
                StepStatus::Succeeded => "succeeded".to_string(),
                StepStatus::Failed => "failed".to_string(),
            },
            value: entry.value.clone(),
            error: entry.error.clone(),
            recorded_at: entry.recorded_at,
        }
    }

    pub fn into_entry(self) -> Result<StepEntry, String> {
        let status = match self.status.as_str() {
            "succeeded" => StepStatus::Succeeded,
            "failed" => StepStatus::Failed,
            other => return Err(format!("unknown step status: {other}")),
        };
        Ok(StepEntry {
            step: self.step,
            status,
            value: self.value,
            error: self.error,
            recorded_at: self.recorded_at,
        })
    }
}

// -- enum <-> string helpers -----------------------------------------------

pub(crate) fn status_str(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Created => "CREATED",
        TicketStatus::InProgress => "IN_PROGRESS",
        TicketStatus::Resolved => "RESOLVED",
    }
}

pub(crate) fn parse_status(s: &str) -> Result<TicketStatus, String> {
    match s {
        "CREATED" => Ok(TicketStatus::Created),
        "IN_PROGRESS" => Ok(TicketStatus::InProgress),
        "RESOLVED" => Ok(TicketStatus::Resolved),
        other => Err(format!("unknown ticket status: {other}")),
    }
}

pub(crate) fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
    }
}

pub(crate) fn role_str(role: Role) -> &'static str {
    match role {
        Role::Requester => "requester",
        Role::Moderator => "moderator",
        Role::Admin => "admin",
    }
}

pub(crate) fn parse_role(s: &str) -> Result<Role, String> {
    match s {
        "requester" => Ok(Role::Requester),
        "moderator" => Ok(Role::Moderator),
        "admin" => Ok(Role::Admin),
        other => Err(format!("unknown role: {other}")),
    }
}

pub(crate) fn run_state_str(state: RunState) -> &'static str {
    match state {
        RunState::Running => "running",
        RunState::Succeeded => "succeeded",
        RunState::Failed => "failed",
    }
}

pub(crate) fn parse_run_state(s: &str) -> Result<RunState, String> {
    match s {
        "running" => Ok(RunState::Running),
        "succeeded" => Ok(RunState::Succeeded),
        "failed" => Ok(RunState::Failed),
        other => Err(format!("unknown run state: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_round_trips_through_row() {
        let mut ticket = Ticket::new("VPN broken".into(), "desc".into(), UserId::new());
        ticket.priority = Some(Priority::High);
        ticket.skills = vec!["networking".into()];

        let row = TicketRow::from_ticket(&ticket);
        let back = row.into_ticket().unwrap();
        assert_eq!(back, ticket);
    }

    #[test]
    fn unknown_status_rejected() {
        assert!(parse_status("DONE").is_err());
        assert!(parse_role("root").is_err());
        assert!(parse_run_state("cancelled").is_err());
    }
}
