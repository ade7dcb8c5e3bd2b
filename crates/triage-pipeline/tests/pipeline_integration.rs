//! End-to-end pipeline runs against in-memory stores and scripted
//! capabilities.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use triage_core::domain::TriggerEvent;
use triage_core::{
    Classifier, ClassifierError, KeywordClassifier, Notifier, NotifyError, TicketSuggestion,
    WorkflowEngine, DEFAULT_MAX_ATTEMPTS,
};
use triage_pipeline::{SignupPipeline, TicketPipeline};
use triage_state::fakes::{MemoryDirectoryStore, MemoryRunStore, MemoryTicketStore};
use triage_state::{
    DirectoryStore, Priority, Role, RunState, RunStore, StepStatus, Ticket, TicketStatus,
    TicketStore, User, UserId,
};

/// How a scripted classifier failure presents itself.
enum ScriptedFailure {
    Timeout,
    Request,
}

/// Classifier that fails a scripted number of calls, then returns a fixed
/// suggestion. The counter exposes how often classification actually ran.
struct ScriptedClassifier {
    suggestion: TicketSuggestion,
    fail_times: u32,
    failure: ScriptedFailure,
    calls: AtomicU32,
}

impl ScriptedClassifier {
    fn returning(suggestion: TicketSuggestion) -> Self {
        Self {
            suggestion,
            fail_times: 0,
            failure: ScriptedFailure::Timeout,
            calls: AtomicU32::new(0),
        }
    }

    fn timing_out_first(fail_times: u32, suggestion: TicketSuggestion) -> Self {
        Self {
            suggestion,
            fail_times,
            failure: ScriptedFailure::Timeout,
            calls: AtomicU32::new(0),
        }
    }

    fn erroring(suggestion: TicketSuggestion) -> Self {
        Self {
            suggestion,
            fail_times: u32::MAX,
            failure: ScriptedFailure::Request,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        _title: &str,
        _description: &str,
    ) -> Result<TicketSuggestion, ClassifierError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            match self.failure {
                ScriptedFailure::Timeout => {
                    Err(ClassifierError::Timeout(std::time::Duration::from_secs(30)))
                }
                ScriptedFailure::Request => {
                    Err(ClassifierError::Request("connection reset".to_string()))
                }
            }
        } else {
            Ok(self.suggestion.clone())
        }
    }
}

/// Notifier that counts deliveries and optionally fails a scripted number
/// of calls.
struct CountingNotifier {
    calls: AtomicU32,
    fail_times: u32,
}

impl CountingNotifier {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times: 0,
        }
    }

    fn failing_first(fail_times: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            Err(NotifyError::Request("smtp relay refused".to_string()))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    tickets: Arc<MemoryTicketStore>,
    directory: Arc<MemoryDirectoryStore>,
    runs: Arc<MemoryRunStore>,
    classifier: Arc<ScriptedClassifier>,
    notifier: Arc<CountingNotifier>,
    engine: WorkflowEngine,
    pipeline: TicketPipeline,
}

fn harness(classifier: ScriptedClassifier, notifier: CountingNotifier) -> Harness {
    let tickets = Arc::new(MemoryTicketStore::new());
    let directory = Arc::new(MemoryDirectoryStore::new());
    let runs = Arc::new(MemoryRunStore::new());
    let classifier = Arc::new(classifier);
    let notifier = Arc::new(notifier);
    let engine = WorkflowEngine::new(runs.clone());
    let pipeline = TicketPipeline::new(
        tickets.clone(),
        directory.clone(),
        classifier.clone(),
        notifier.clone(),
    );
    Harness {
        tickets,
        directory,
        runs,
        classifier,
        notifier,
        engine,
        pipeline,
    }
}

fn suggestion(priority: &str, skills: &[&str]) -> TicketSuggestion {
    TicketSuggestion {
        priority: priority.to_string(),
        note: "Check the firewall rules first".to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
    }
}

async fn file_ticket(tickets: &MemoryTicketStore, title: &str, description: &str) -> Ticket {
    let ticket = Ticket::new(title.to_string(), description.to_string(), UserId::new());
    tickets.insert(ticket.clone()).await.unwrap();
    ticket
}

async fn add_user(directory: &MemoryDirectoryStore, email: &str, role: Role, skills: &[&str]) -> User {
    let user = User::new(
        email.to_string(),
        role,
        skills.iter().map(|s| s.to_string()).collect(),
    );
    directory.insert(user.clone()).await.unwrap();
    user
}

#[tokio::test]
async fn happy_path_assigns_and_notifies() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("high", &["networking"])),
        CountingNotifier::new(),
    );
    let moderator = add_user(&h.directory, "netops@triage.dev", Role::Moderator, &["networking"]).await;
    add_user(&h.directory, "root@triage.dev", Role::Admin, &[]).await;
    let ticket = file_ticket(&h.tickets, "VPN broken", "Cannot connect to the VPN since 9am").await;

    let outcome = h
        .engine
        .dispatch(&h.pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;
    assert!(outcome.success, "{}", outcome.message);

    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::InProgress);
    // A recognized priority token lands as Medium.
    assert_eq!(stored.priority, Some(Priority::Medium));
    assert_eq!(stored.note.as_deref(), Some("Check the firewall rules first"));
    assert_eq!(stored.skills, vec!["networking".to_string()]);
    assert_eq!(stored.assignee, Some(moderator.id));
    assert_eq!(h.notifier.calls(), 1);
}

#[tokio::test]
async fn unrecognized_priority_leaves_ticket_unprioritized() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("urgent", &["networking"])),
        CountingNotifier::new(),
    );
    let ticket = file_ticket(&h.tickets, "Printer jam", "Paper stuck again").await;

    let outcome = h
        .engine
        .dispatch(&h.pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;
    assert!(outcome.success);

    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert!(stored.priority.is_none());
    assert_eq!(stored.status, TicketStatus::InProgress);
}

#[tokio::test]
async fn moderator_beats_admin_on_skill_match() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("medium", &["react", "css"])),
        CountingNotifier::new(),
    );
    add_user(&h.directory, "root@triage.dev", Role::Admin, &[]).await;
    let moderator = add_user(&h.directory, "frontend@triage.dev", Role::Moderator, &["React"]).await;
    let ticket = file_ticket(&h.tickets, "Button misaligned", "Dashboard render glitch").await;

    h.engine
        .dispatch(&h.pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;

    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert_eq!(stored.assignee, Some(moderator.id));
}

#[tokio::test]
async fn admin_catches_unmatched_skills() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("low", &["kubernetes"])),
        CountingNotifier::new(),
    );
    add_user(&h.directory, "frontend@triage.dev", Role::Moderator, &["react"]).await;
    let admin = add_user(&h.directory, "root@triage.dev", Role::Admin, &[]).await;
    let ticket = file_ticket(&h.tickets, "Pod crashloop", "Deploy keeps restarting").await;

    h.engine
        .dispatch(&h.pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;

    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert_eq!(stored.assignee, Some(admin.id));
    assert_eq!(h.notifier.calls(), 1);
}

#[tokio::test]
async fn empty_directory_still_succeeds_without_notification() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("high", &["networking"])),
        CountingNotifier::new(),
    );
    let ticket = file_ticket(&h.tickets, "VPN broken", "Cannot connect").await;

    let outcome = h
        .engine
        .dispatch(&h.pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;
    assert!(outcome.success);

    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert!(stored.assignee.is_none());
    assert_eq!(h.notifier.calls(), 0);
}

#[tokio::test]
async fn missing_ticket_fails_without_classifying() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("high", &[])),
        CountingNotifier::new(),
    );
    let ticket = file_ticket(&h.tickets, "Ghost", "Gone before processing").await;
    let event = TriggerEvent::ticket_created(&ticket);
    h.tickets.remove(&ticket.id);

    let outcome = h.engine.dispatch(&h.pipeline, &event).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("not found"));

    // No retry budget spent, no downstream capability touched.
    let run = h
        .runs
        .find_or_create(triage_core::TICKET_CREATED, &event.dedupe_key(), &event.data)
        .await
        .unwrap();
    assert_eq!(run.attempts, 1);
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(h.classifier.calls(), 0);
    assert_eq!(h.notifier.calls(), 0);
}

#[tokio::test]
async fn classifier_timeout_retries_without_replaying_writes() {
    let h = harness(
        ScriptedClassifier::timing_out_first(1, suggestion("high", &["networking"])),
        CountingNotifier::new(),
    );
    add_user(&h.directory, "netops@triage.dev", Role::Moderator, &["networking"]).await;
    let ticket = file_ticket(&h.tickets, "VPN broken", "Cannot connect").await;
    let event = TriggerEvent::ticket_created(&ticket);

    let outcome = h.engine.dispatch(&h.pipeline, &event).await;
    assert!(outcome.success, "{}", outcome.message);

    // Classification runs on every attempt; it is never memoized.
    assert_eq!(h.classifier.calls(), 2);
    // Exactly one notification despite the retry.
    assert_eq!(h.notifier.calls(), 1);

    let run = h
        .runs
        .find_or_create(triage_core::TICKET_CREATED, &event.dedupe_key(), &event.data)
        .await
        .unwrap();
    assert_eq!(run.attempts, 2);
    assert_eq!(run.state, RunState::Succeeded);

    // The steps before the failure were recorded once and replayed.
    let steps = h.runs.steps(&run.run_id).await.unwrap();
    let fetches: Vec<_> = steps.iter().filter(|s| s.step == "fetch-ticket").collect();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].status, StepStatus::Succeeded);
}

#[tokio::test]
async fn persistent_classifier_timeout_exhausts_budget() {
    let h = harness(
        ScriptedClassifier::timing_out_first(u32::MAX, suggestion("high", &[])),
        CountingNotifier::new(),
    );
    let ticket = file_ticket(&h.tickets, "VPN broken", "Cannot connect").await;
    let event = TriggerEvent::ticket_created(&ticket);

    let outcome = h.engine.dispatch(&h.pipeline, &event).await;
    assert!(!outcome.success);
    assert_eq!(h.classifier.calls(), DEFAULT_MAX_ATTEMPTS);
    assert_eq!(h.notifier.calls(), 0);

    // The ticket was still moved along by the steps that did complete.
    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::InProgress);
    assert!(stored.priority.is_none());
}

#[tokio::test]
async fn classifier_error_degrades_to_unclassified_ticket() {
    let h = harness(
        ScriptedClassifier::erroring(suggestion("high", &["networking"])),
        CountingNotifier::new(),
    );
    add_user(&h.directory, "netops@triage.dev", Role::Moderator, &["networking"]).await;
    let admin = add_user(&h.directory, "root@triage.dev", Role::Admin, &[]).await;
    let ticket = file_ticket(&h.tickets, "VPN broken", "Cannot connect").await;

    let outcome = h
        .engine
        .dispatch(&h.pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;
    // A non-timeout classifier failure does not burn the retry budget.
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(h.classifier.calls(), 1);

    // No analysis applied; empty skills fall through to the admin.
    let stored = h.tickets.get(&ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::InProgress);
    assert!(stored.priority.is_none());
    assert!(stored.skills.is_empty());
    assert_eq!(stored.assignee, Some(admin.id));
    assert_eq!(h.notifier.calls(), 1);
}

#[tokio::test]
async fn duplicate_event_replays_outcome_without_side_effects() {
    let h = harness(
        ScriptedClassifier::returning(suggestion("high", &["networking"])),
        CountingNotifier::new(),
    );
    add_user(&h.directory, "netops@triage.dev", Role::Moderator, &["networking"]).await;
    let ticket = file_ticket(&h.tickets, "VPN broken", "Cannot connect").await;
    let event = TriggerEvent::ticket_created(&ticket);

    let first = h.engine.dispatch(&h.pipeline, &event).await;
    let second = h.engine.dispatch(&h.pipeline, &event).await;
    assert_eq!(first, second);
    assert_eq!(h.classifier.calls(), 1);
    assert_eq!(h.notifier.calls(), 1);
}

#[tokio::test]
async fn keyword_classifier_drives_the_pipeline_offline() {
    let tickets = Arc::new(MemoryTicketStore::new());
    let directory = Arc::new(MemoryDirectoryStore::new());
    let runs = Arc::new(MemoryRunStore::new());
    let notifier = Arc::new(CountingNotifier::new());
    let engine = WorkflowEngine::new(runs.clone());
    let pipeline = TicketPipeline::new(
        tickets.clone(),
        directory.clone(),
        Arc::new(KeywordClassifier::new()),
        notifier.clone(),
    );

    let moderator = add_user(&directory, "netops@triage.dev", Role::Moderator, &["networking"]).await;
    let ticket = file_ticket(&tickets, "VPN broken", "Cannot connect to the VPN").await;

    let outcome = engine
        .dispatch(&pipeline, &TriggerEvent::ticket_created(&ticket))
        .await;
    assert!(outcome.success, "{}", outcome.message);

    let stored = tickets.get(&ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::InProgress);
    assert_eq!(stored.assignee, Some(moderator.id));
    assert_eq!(notifier.calls(), 1);
}

#[tokio::test]
async fn signup_sends_one_welcome_mail() {
    let directory = Arc::new(MemoryDirectoryStore::new());
    let runs = Arc::new(MemoryRunStore::new());
    let notifier = Arc::new(CountingNotifier::new());
    let engine = WorkflowEngine::new(runs);
    let pipeline = SignupPipeline::new(directory.clone(), notifier.clone());

    add_user(&directory, "new@triage.dev", Role::Requester, &[]).await;
    let event = TriggerEvent::user_signed_up("new@triage.dev");

    let outcome = engine.dispatch(&pipeline, &event).await;
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(notifier.calls(), 1);

    // Re-publishing the same signup never mails twice.
    let replay = engine.dispatch(&pipeline, &event).await;
    assert_eq!(outcome, replay);
    assert_eq!(notifier.calls(), 1);
}

#[tokio::test]
async fn signup_retries_flaky_mail_delivery() {
    let directory = Arc::new(MemoryDirectoryStore::new());
    let runs = Arc::new(MemoryRunStore::new());
    let notifier = Arc::new(CountingNotifier::failing_first(1));
    let engine = WorkflowEngine::new(runs.clone());
    let pipeline = SignupPipeline::new(directory.clone(), notifier.clone());

    add_user(&directory, "new@triage.dev", Role::Requester, &[]).await;
    let event = TriggerEvent::user_signed_up("new@triage.dev");

    let outcome = engine.dispatch(&pipeline, &event).await;
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(notifier.calls(), 2);

    let run = runs
        .find_or_create(triage_core::USER_SIGNED_UP, &event.dedupe_key(), &event.data)
        .await
        .unwrap();
    assert_eq!(run.attempts, 2);
}

#[tokio::test]
async fn signup_for_unknown_user_fails_fast() {
    let directory = Arc::new(MemoryDirectoryStore::new());
    let runs = Arc::new(MemoryRunStore::new());
    let notifier = Arc::new(CountingNotifier::new());
    let engine = WorkflowEngine::new(runs.clone());
    let pipeline = SignupPipeline::new(directory, notifier.clone());

    let event = TriggerEvent::user_signed_up("nobody@triage.dev");
    let outcome = engine.dispatch(&pipeline, &event).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("not found"));
    assert_eq!(notifier.calls(), 0);

    let run = runs
        .find_or_create(triage_core::USER_SIGNED_UP, &event.dedupe_key(), &event.data)
        .await
        .unwrap();
    assert_eq!(run.attempts, 1);
}
