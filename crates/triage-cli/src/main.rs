//! Triage CLI
//!
//! The `triage` command seeds the user directory, files tickets, and
//! inspects tickets and workflow runs. Filing a ticket drives its pipeline
//! inline, so the command works without a running daemon.
//!
//! ## Commands
//!
//! - `user signup|add|list`: manage the directory
//! - `create-admin`: bootstrap an admin account
//! - `ticket create|show|list`: file and inspect tickets
//! - `runs list`: inspect workflow runs

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use triage_core::{
    classifier_from_env, notifier_from_env, DirectoryService, EventBus, TicketService,
    TriggerEvent, WorkflowEngine,
};
use triage_pipeline::{SignupPipeline, TicketPipeline};
use triage_state::{DirectoryStore, Role, RunStore, SurrealStores, TicketId, TicketStore};

#[derive(Parser)]
#[command(name = "triage")]
#[command(author = "Triage Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Durable support-ticket processing", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON: log lines and inspect-command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the user directory
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Bootstrap an admin account (idempotent)
    CreateAdmin {
        /// Admin email address
        email: String,
    },

    /// File and inspect tickets
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },

    /// Inspect workflow runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a requester account and send the welcome mail
    Signup {
        /// Email address (unique)
        email: String,

        /// Skill tags, comma-separated
        #[arg(short, long, value_delimiter = ',')]
        skills: Vec<String>,
    },

    /// Create a user with an explicit role
    Add {
        /// Email address (unique)
        email: String,

        /// Role: requester, moderator, or admin
        #[arg(short, long, default_value = "moderator")]
        role: String,

        /// Skill tags, comma-separated
        #[arg(short, long, value_delimiter = ',')]
        skills: Vec<String>,
    },

    /// List directory entries in creation order
    List,
}

#[derive(Subcommand)]
enum TicketAction {
    /// File a ticket and process it end to end
    Create {
        /// Short summary
        #[arg(short, long)]
        title: String,

        /// Full problem description
        #[arg(short, long)]
        description: String,

        /// Email of the filing user (created as requester if unknown)
        #[arg(long, default_value = "cli@triage.dev")]
        by: String,
    },

    /// Show one ticket
    Show {
        /// Ticket id
        id: String,
    },

    /// List all tickets
    List,
}

#[derive(Subcommand)]
enum RunsAction {
    /// List workflow runs
    List {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn parse_role(role: &str) -> Result<Role> {
    match role.to_ascii_lowercase().as_str() {
        "requester" => Ok(Role::Requester),
        "moderator" => Ok(Role::Moderator),
        "admin" => Ok(Role::Admin),
        other => bail!("unknown role: {other} (expected requester, moderator, or admin)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    triage_core::init_tracing(cli.json, level);

    let stores = Arc::new(
        SurrealStores::from_env()
            .await
            .context("Failed to connect to triage database")?,
    );

    match cli.command {
        Commands::User { action } => match action {
            UserAction::Signup { email, skills } => cmd_user_signup(&stores, &email, skills).await,
            UserAction::Add {
                email,
                role,
                skills,
            } => cmd_user_add(&stores, &email, &role, skills).await,
            UserAction::List => cmd_user_list(&stores, cli.json).await,
        },
        Commands::CreateAdmin { email } => cmd_create_admin(&stores, &email).await,
        Commands::Ticket { action } => match action {
            TicketAction::Create {
                title,
                description,
                by,
            } => cmd_ticket_create(&stores, &title, &description, &by).await,
            TicketAction::Show { id } => cmd_ticket_show(&stores, &id, cli.json).await,
            TicketAction::List => cmd_ticket_list(&stores, cli.json).await,
        },
        Commands::Runs { action } => match action {
            RunsAction::List { limit } => cmd_runs_list(&stores, limit, cli.json).await,
        },
    }
}

/// Register a requester, then run the signup pipeline inline.
async fn cmd_user_signup(stores: &Arc<SurrealStores>, email: &str, skills: Vec<String>) -> Result<()> {
    let (bus, _events) = EventBus::new();
    let directory = DirectoryService::new(stores.clone(), bus);
    let user = directory.sign_up(email, skills).await?;
    println!("Registered {} ({})", user.email, user.id);

    let engine = WorkflowEngine::new(stores.clone());
    let pipeline = SignupPipeline::new(stores.clone(), notifier_from_env());
    let outcome = engine
        .dispatch(&pipeline, &TriggerEvent::user_signed_up(email))
        .await;
    if outcome.success {
        println!("Signup pipeline: {}", outcome.message);
    } else {
        println!("Signup pipeline failed: {}", outcome.message);
    }
    Ok(())
}

async fn cmd_user_add(
    stores: &Arc<SurrealStores>,
    email: &str,
    role: &str,
    skills: Vec<String>,
) -> Result<()> {
    let role = parse_role(role)?;
    let (bus, _events) = EventBus::new();
    let directory = DirectoryService::new(stores.clone(), bus);
    let user = directory.add_user(email, role, skills).await?;
    println!("Created {} ({:?}, {})", user.email, user.role, user.id);
    Ok(())
}

async fn cmd_user_list(stores: &Arc<SurrealStores>, json: bool) -> Result<()> {
    let users = DirectoryStore::list(stores.as_ref()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    for user in users {
        println!(
            "{}  {:<12}  {:<30}  [{}]",
            user.id,
            format!("{:?}", user.role).to_lowercase(),
            user.email,
            user.skills.join(", ")
        );
    }
    Ok(())
}

async fn cmd_create_admin(stores: &Arc<SurrealStores>, email: &str) -> Result<()> {
    let (bus, _events) = EventBus::new();
    let directory = DirectoryService::new(stores.clone(), bus);
    let admin = directory.create_admin(email).await?;
    println!("Admin ready: {} ({})", admin.email, admin.id);
    Ok(())
}

/// File a ticket and drive its pipeline to a terminal state.
async fn cmd_ticket_create(
    stores: &Arc<SurrealStores>,
    title: &str,
    description: &str,
    by: &str,
) -> Result<()> {
    let (bus, _events) = EventBus::new();
    let directory = DirectoryService::new(stores.clone(), bus.clone());
    let creator = match stores.find_by_email(by).await? {
        Some(user) => user,
        None => directory.add_user(by, Role::Requester, Vec::new()).await?,
    };

    let tickets = TicketService::new(stores.clone(), bus);
    let ticket = tickets.create_ticket(title, description, &creator.id).await?;
    println!("Filed ticket {}", ticket.id);

    let engine = WorkflowEngine::new(stores.clone());
    let pipeline = TicketPipeline::new(
        stores.clone(),
        stores.clone(),
        classifier_from_env(),
        notifier_from_env(),
    );
    let outcome = engine
        .dispatch(&pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;
    if outcome.success {
        println!("Pipeline: {}", outcome.message);
    } else {
        println!("Pipeline failed: {}", outcome.message);
    }

    print_ticket(&TicketStore::get(stores.as_ref(), &ticket.id).await?);
    Ok(())
}

async fn cmd_ticket_show(stores: &Arc<SurrealStores>, id: &str, json: bool) -> Result<()> {
    let ticket = TicketStore::get(stores.as_ref(), &TicketId(id.to_string())).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ticket)?);
    } else {
        print_ticket(&ticket);
    }
    Ok(())
}

async fn cmd_ticket_list(stores: &Arc<SurrealStores>, json: bool) -> Result<()> {
    let tickets = TicketStore::list(stores.as_ref()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tickets)?);
        return Ok(());
    }
    if tickets.is_empty() {
        println!("No tickets.");
        return Ok(());
    }
    for ticket in tickets {
        println!(
            "{}  {:?}  {}  {}",
            ticket.id,
            ticket.status,
            ticket
                .priority
                .map(|p| format!("{p:?}").to_lowercase())
                .unwrap_or_else(|| "-".to_string()),
            ticket.title
        );
    }
    Ok(())
}

async fn cmd_runs_list(stores: &Arc<SurrealStores>, limit: usize, json: bool) -> Result<()> {
    let mut runs = RunStore::list(stores.as_ref()).await?;
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs.truncate(limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs.");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:<14}  {:?}  attempts={}  {}",
            run.run_id,
            run.pipeline_id,
            run.state,
            run.attempts,
            run.message.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_ticket(ticket: &triage_state::Ticket) {
    println!("Ticket {}", ticket.id);
    println!("  Title:       {}", ticket.title);
    println!("  Description: {}", ticket.description);
    println!("  Status:      {:?}", ticket.status);
    println!(
        "  Priority:    {}",
        ticket
            .priority
            .map(|p| format!("{p:?}").to_lowercase())
            .unwrap_or_else(|| "unset".to_string())
    );
    if let Some(note) = &ticket.note {
        println!("  Note:        {note}");
    }
    if !ticket.skills.is_empty() {
        println!("  Skills:      {}", ticket.skills.join(", "));
    }
    println!(
        "  Assignee:    {}",
        ticket
            .assignee
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unassigned".to_string())
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_accepts_known_roles() {
        assert_eq!(parse_role("admin").unwrap(), Role::Admin);
        assert_eq!(parse_role("Moderator").unwrap(), Role::Moderator);
        assert!(parse_role("superuser").is_err());
    }

    #[test]
    fn cli_parses_ticket_create() {
        let cli = Cli::try_parse_from([
            "triage",
            "ticket",
            "create",
            "--title",
            "VPN broken",
            "--description",
            "Cannot connect",
        ])
        .unwrap();
        match cli.command {
            Commands::Ticket {
                action: TicketAction::Create { title, by, .. },
            } => {
                assert_eq!(title, "VPN broken");
                assert_eq!(by, "cli@triage.dev");
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["triage", "ticket", "list", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn tickets_serialize_for_json_output() {
        let ticket = triage_state::Ticket::new(
            "VPN broken".into(),
            "Cannot connect".into(),
            triage_state::UserId::new(),
        );
        let rendered = serde_json::to_string_pretty(&ticket).unwrap();
        assert!(rendered.contains("\"title\": \"VPN broken\""));
        assert!(rendered.contains("\"status\""));
    }
}
