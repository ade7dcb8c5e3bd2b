//! Core record types shared by every storage backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a ticket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    /// Generate a new random TicketId
    pub fn new() -> Self {
        TicketId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a directory entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Generate a new random UserId
    pub fn new() -> Self {
        UserId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a ticket.
///
/// Transitions are monotonic: CREATED → IN_PROGRESS → RESOLVED, never
/// backward. Stores enforce this by clamping regressions to a no-op.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Created,
    InProgress,
    Resolved,
}

impl TicketStatus {
    /// Position in the lifecycle, used for the monotonicity clamp.
    pub fn rank(&self) -> u8 {
        match self {
            TicketStatus::Created => 0,
            TicketStatus::InProgress => 1,
            TicketStatus::Resolved => 2,
        }
    }
}

/// Ticket priority, set by classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Parse one of the canonical tokens, case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Role of a directory entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Moderator,
    Admin,
}

/// A support ticket document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Unique identifier, immutable.
    pub id: TicketId,

    /// Short summary, set at creation.
    pub title: String,

    /// Full problem description, set at creation.
    pub description: String,

    /// Lifecycle status (monotonic).
    pub status: TicketStatus,

    /// Priority, absent until classified.
    pub priority: Option<Priority>,

    /// Remediation note from classification.
    pub note: Option<String>,

    /// Skill tags derived by classification, in classifier order.
    pub skills: Vec<String>,

    /// Weak reference to the assigned directory entry.
    pub assignee: Option<UserId>,

    /// Who filed the ticket.
    pub created_by: UserId,

    /// When the ticket was filed.
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Create a fresh ticket in CREATED state.
    pub fn new(title: String, description: String, created_by: UserId) -> Self {
        Self {
            id: TicketId::new(),
            title,
            description,
            status: TicketStatus::Created,
            priority: None,
            note: None,
            skills: Vec::new(),
            assignee: None,
            created_by,
            created_at: Utc::now(),
        }
    }
}

/// Classification output applied to a ticket in one write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketAnalysis {
    pub priority: Option<Priority>,
    pub note: Option<String>,
    pub skills: Vec<String>,
}

/// A directory entry (user account).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,

    /// Unique email address.
    pub email: String,

    /// Role used by the assignment policy.
    pub role: Role,

    /// Skill tags used for matching.
    pub skills: Vec<String>,

    /// When the account was created. Assignment lookups order by this.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new directory entry.
    pub fn new(email: String, role: Role, skills: Vec<String>) -> Self {
        Self {
            id: UserId::new(),
            email,
            role,
            skills,
            created_at: Utc::now(),
        }
    }
}

/// Terminal or in-flight state of a workflow run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

/// Outcome of a single recorded step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// One entry in a run's step log.
///
/// Exactly one terminal entry exists per step name; a failed entry is
/// replaced if a later attempt succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepEntry {
    /// Step name, unique within the run.
    pub step: String,

    /// Whether the step succeeded.
    pub status: StepStatus,

    /// Serialized step result (present on success).
    pub value: Option<serde_json::Value>,

    /// Failure message (present on failure).
    pub error: Option<String>,

    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl StepEntry {
    /// Build a success entry.
    pub fn succeeded(step: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Succeeded,
            value: Some(value),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    /// Build a failure entry.
    pub fn failed(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Failed,
            value: None,
            error: Some(error.into()),
            recorded_at: Utc::now(),
        }
    }
}

/// A durable workflow run, keyed by `(pipeline_id, dedupe_key)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,

    /// Which pipeline this run executes.
    pub pipeline_id: String,

    /// Idempotency key derived from the triggering event.
    pub dedupe_key: String,

    /// Triggering event payload.
    pub payload: serde_json::Value,

    /// Current state; Succeeded/Failed are terminal.
    pub state: RunState,

    /// How many attempts have started.
    pub attempts: u32,

    /// Terminal outcome message, if finished.
    pub message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a fresh run in Running state with zero attempts.
    pub fn new(pipeline_id: String, dedupe_key: String, payload: serde_json::Value) -> Self {
        Self {
            run_id: RunId::new(),
            pipeline_id,
            dedupe_key,
            payload,
            state: RunState::Running,
            attempts: 0,
            message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether the run reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state != RunState::Running
    }
}
