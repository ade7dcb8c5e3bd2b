//! triaged: the Triage daemon.
//!
//! Wires persistence, the classifier and notifier capabilities, the
//! workflow engine, and both pipelines, then consumes trigger events from
//! the in-process bus. On startup, unfinished runs left behind by a crash
//! are republished onto the bus; memoized steps make that resume safe.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use triage_core::{
    classifier_from_env, notifier_from_env, EventBus, Pipeline, TriggerEvent, WorkflowEngine,
    TICKET_CREATED, USER_SIGNED_UP,
};
use triage_pipeline::{SignupPipeline, TicketPipeline};
use triage_state::{RunStore, SurrealStores};

#[derive(Parser)]
#[command(name = "triaged")]
#[command(author = "Triage Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Triage daemon: durable ticket processing", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

struct Daemon {
    engine: Arc<WorkflowEngine>,
    tickets: Arc<TicketPipeline>,
    signups: Arc<SignupPipeline>,
    runs: Arc<dyn RunStore>,
    bus: EventBus,
}

impl Daemon {
    /// Republish runs that never reached a terminal state onto the bus.
    /// The consume loop picks them up like any other trigger; completed
    /// steps replay from the step log, so work is not repeated.
    async fn resume_unfinished(&self) {
        let runs = match self.runs.list().await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "could not scan for unfinished runs");
                return;
            }
        };

        for run in runs.into_iter().filter(|r| !r.is_terminal()) {
            let event = TriggerEvent {
                name: run.pipeline_id.clone(),
                data: run.payload.clone(),
            };
            info!(run_id = %run.run_id, pipeline_id = %run.pipeline_id, "resuming unfinished run");
            self.bus.publish(event);
        }
    }

    /// Drive one event to completion on its own task.
    fn dispatch(&self, event: TriggerEvent) {
        let pipeline: Arc<dyn Pipeline> = match event.name.as_str() {
            TICKET_CREATED => self.tickets.clone(),
            USER_SIGNED_UP => self.signups.clone(),
            other => {
                warn!(event = %other, "no pipeline registered for event");
                return;
            }
        };

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let outcome = engine.dispatch(pipeline.as_ref(), &event).await;
            if !outcome.success {
                warn!(event = %event.name, message = %outcome.message, "run failed");
            }
        });
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

    let classifier = classifier_from_env();
    let notifier = notifier_from_env();

    let engine = Arc::new(WorkflowEngine::new(stores.clone()));
    let tickets = Arc::new(TicketPipeline::new(
        stores.clone(),
        stores.clone(),
        classifier,
        notifier.clone(),
    ));
    let signups = Arc::new(SignupPipeline::new(stores.clone(), notifier));

    // Unfinished runs are republished through the same bus the loop
    // drains; an embedding admission surface clones the producer half.
    let (bus, mut events) = EventBus::new();

    let daemon = Daemon {
        engine,
        tickets,
        signups,
        runs: stores.clone(),
        bus,
    };

    daemon.resume_unfinished().await;
    info!(version = triage_core::VERSION, "triaged started");

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                match maybe_event {
                    Some(event) => daemon.dispatch(event),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{Classifier, KeywordClassifier, LogNotifier, Notifier};
    use triage_state::fakes::{MemoryDirectoryStore, MemoryRunStore, MemoryTicketStore};

    fn test_daemon(runs: Arc<MemoryRunStore>, bus: EventBus) -> Daemon {
        let tickets = Arc::new(MemoryTicketStore::new());
        let directory = Arc::new(MemoryDirectoryStore::new());
        let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new());
        Daemon {
            engine: Arc::new(WorkflowEngine::new(runs.clone())),
            tickets: Arc::new(TicketPipeline::new(
                tickets,
                directory.clone(),
                classifier,
                notifier.clone(),
            )),
            signups: Arc::new(SignupPipeline::new(directory, notifier)),
            runs,
            bus,
        }
    }

    #[tokio::test]
    async fn resume_republishes_unfinished_runs_onto_the_bus() {
        let (bus, mut events) = EventBus::new();
        let runs = Arc::new(MemoryRunStore::new());
        let payload = TriggerEvent::user_signed_up("pat@triage.dev").data;
        runs.find_or_create(USER_SIGNED_UP, "k1", &payload)
            .await
            .unwrap();

        let daemon = test_daemon(runs, bus);
        daemon.resume_unfinished().await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.name, USER_SIGNED_UP);
        assert_eq!(event.data, payload);
    }

    #[tokio::test]
    async fn terminal_runs_stay_off_the_bus() {
        let (bus, mut events) = EventBus::new();
        let runs = Arc::new(MemoryRunStore::new());
        let payload = TriggerEvent::user_signed_up("pat@triage.dev").data;
        let run = runs
            .find_or_create(USER_SIGNED_UP, "k1", &payload)
            .await
            .unwrap();
        runs.complete(&run.run_id, "done").await.unwrap();

        let daemon = test_daemon(runs, bus);
        daemon.resume_unfinished().await;

        assert!(events.try_recv().is_err());
    }
}
