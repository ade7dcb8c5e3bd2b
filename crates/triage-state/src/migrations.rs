//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with proper constraints and indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Triage tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Triage SurrealDB schema");

    init_tickets_table(db).await?;
    init_users_table(db).await?;
    init_runs_table(db).await?;
    init_run_steps_table(db).await?;

    info!("Triage schema initialization complete");
    Ok(())
}

/// Initialize `tickets` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE tickets {
///   ticket_id:    STRING (primary key, unique)
///   title:        STRING
///   description:  STRING
///   status:       STRING (enum: CREATED | IN_PROGRESS | RESOLVED)
///   priority:     STRING? (enum: low | medium | high)
///   note:         STRING?
///   skills:       ARRAY<STRING>
///   assignee:     STRING? (users.user_id, weak reference)
///   created_by:   STRING (users.user_id)
///   created_at:   DATETIME (indexed)
/// }
/// ```
///
/// Constraints:
/// - `ticket_id` is unique
/// - Status transitions CREATED → IN_PROGRESS → RESOLVED are monotonic,
///   enforced via app logic
async fn init_tickets_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing tickets table");

    let sql = r#"
        DEFINE TABLE tickets
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        -- Ensure ticket_id is unique
        DEFINE INDEX idx_ticket_id ON TABLE tickets COLUMNS ticket_id UNIQUE;

        -- Index created_at for newest-first listing
        DEFINE INDEX idx_ticket_created_at ON TABLE tickets COLUMNS created_at;

        -- Index created_by for per-requester views
        DEFINE INDEX idx_ticket_created_by ON TABLE tickets COLUMNS created_by;
    "#;

    db.query(sql).await?;
    info!("✓ tickets table initialized");
    Ok(())
}

/// Initialize `users` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE users {
///   user_id:     STRING (primary key, unique)
///   email:       STRING (unique)
///   role:        STRING (enum: requester | moderator | admin)
///   skills:      ARRAY<STRING>
///   created_at:  DATETIME (assignment lookups order by this)
/// }
/// ```
async fn init_users_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing users table");

    let sql = r#"
        DEFINE TABLE users
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        -- Ensure user_id and email are unique
        DEFINE INDEX idx_user_id ON TABLE users COLUMNS user_id UNIQUE;
        DEFINE INDEX idx_user_email ON TABLE users COLUMNS email UNIQUE;

        -- Composite index (role, created_at) for assignment lookups
        DEFINE INDEX idx_user_role_created_at ON TABLE users COLUMNS role, created_at;
    "#;

    db.query(sql).await?;
    info!("✓ users table initialized");
    Ok(())
}

/// Initialize `runs` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE runs {
///   run_id:        STRING (primary key, unique)
///   pipeline_id:   STRING
///   dedupe_key:    STRING
///   payload:       OBJECT
///   state:         STRING (enum: running | succeeded | failed)
///   attempts:      INT
///   message:       STRING?
///   created_at:    DATETIME (indexed)
///   completed_at:  DATETIME?
/// }
/// ```
///
/// Constraints:
/// - `run_id` is unique
/// - `(pipeline_id, dedupe_key)` is unique (one run per triggering event)
/// - `state` transitions: running → succeeded | failed (enforced via app logic)
async fn init_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing runs table");

    let sql = r#"
        DEFINE TABLE runs
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        -- Ensure run_id is unique
        DEFINE INDEX idx_run_id ON TABLE runs COLUMNS run_id UNIQUE;

        -- One run per triggering event
        DEFINE INDEX idx_pipeline_dedupe ON TABLE runs COLUMNS pipeline_id, dedupe_key UNIQUE;

        -- Index created_at for time-range queries
        DEFINE INDEX idx_run_created_at ON TABLE runs COLUMNS created_at;
    "#;

    db.query(sql).await?;
    info!("✓ runs table initialized");
    Ok(())
}

/// Initialize `run_steps` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE run_steps {
///   run_id:       STRING (foreign key to runs.run_id)
///   step:         STRING (step name, unique within run)
///   status:       STRING (enum: succeeded | failed)
///   value:        OBJECT? (serialized result on success)
///   error:        STRING? (failure message)
///   recorded_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(run_id, step)` is unique: at most one terminal entry per step name.
///   `record_step` replaces a failed entry with a later success by
///   deleting the old row and creating a new one, so deletes stay open.
async fn init_run_steps_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing run_steps table");

    let sql = r#"
        DEFINE TABLE run_steps
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        -- At most one entry per step name per run
        DEFINE INDEX idx_run_step ON TABLE run_steps COLUMNS run_id, step UNIQUE;

        -- Index run_id for fast step-log retrieval
        DEFINE INDEX idx_step_run_id ON TABLE run_steps COLUMNS run_id;
    "#;

    db.query(sql).await?;
    info!("✓ run_steps table initialized");
    Ok(())
}
