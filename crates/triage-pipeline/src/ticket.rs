//! The ticket pipeline: runs once per `ticket/create` event.
//!
//! Step order: fetch the ticket, mark it in progress, classify (outside the
//! step log, so every attempt gets a fresh analysis), persist the analysis,
//! pick an assignee, notify them. Everything except classification is
//! memoized, so a retried run repeats no completed side effect.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use triage_core::domain::{StepError, StepResult, TriggerEvent, TICKET_CREATED};
use triage_core::engine::{Pipeline, StepContext};
use triage_core::{send_best_effort, Classifier, ClassifierError, Notifier, TicketSuggestion};
use triage_state::{
    DirectoryStore, Priority, Role, TicketAnalysis, TicketStatus, TicketStore, User,
};

use crate::assign::select_assignee;

/// Normalize a classifier priority token for persistence.
///
/// A recognized token (low, medium, high, any case) maps to [`Priority::Medium`];
/// an unrecognized one leaves the ticket's priority unset.
pub fn normalize_priority(token: &str) -> Option<Priority> {
    Priority::from_token(token).map(|_| Priority::Medium)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Processes newly filed tickets end to end.
pub struct TicketPipeline {
    tickets: Arc<dyn TicketStore>,
    directory: Arc<dyn DirectoryStore>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
}

impl TicketPipeline {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        directory: Arc<dyn DirectoryStore>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tickets,
            directory,
            classifier,
            notifier,
        }
    }

    fn analysis_from(suggestion: &TicketSuggestion) -> TicketAnalysis {
        TicketAnalysis {
            priority: normalize_priority(&suggestion.priority),
            note: non_empty(&suggestion.note),
            skills: suggestion.skills.clone(),
        }
    }
}

#[async_trait]
impl Pipeline for TicketPipeline {
    fn id(&self) -> &'static str {
        TICKET_CREATED
    }

    async fn execute(&self, ctx: &StepContext, event: &TriggerEvent) -> StepResult<String> {
        // A malformed event can never become valid, so no retry budget
        // is spent on it.
        let ticket_id = event.ticket_id().ok_or(StepError::NotFound {
            entity: "ticket",
            id: "(missing ticketId)".to_string(),
        })?;

        let ticket = ctx
            .step("fetch-ticket", || {
                let tickets = Arc::clone(&self.tickets);
                let id = ticket_id.clone();
                async move { Ok(tickets.get(&id).await?) }
            })
            .await?;

        ctx.step("mark-in-progress", || {
            let tickets = Arc::clone(&self.tickets);
            let id = ticket.id.clone();
            async move {
                tickets.set_status(&id, TicketStatus::InProgress).await?;
                Ok(())
            }
        })
        .await?;

        // Classification stays out of the step log: a retried run gets a
        // fresh analysis rather than replaying a stale one. Only the
        // persisted application of it is memoized. A timeout feeds the
        // retry budget; any other classifier failure degrades to an empty
        // analysis and the ticket proceeds unclassified.
        let suggestion = match self
            .classifier
            .classify(&ticket.title, &ticket.description)
            .await
        {
            Ok(suggestion) => {
                debug!(ticket_id = %ticket.id, priority = %suggestion.priority,
                       skills = ?suggestion.skills, "ticket classified");
                Some(suggestion)
            }
            Err(err @ ClassifierError::Timeout(_)) => {
                return Err(StepError::transient(format!("classifier: {err}")));
            }
            Err(err) => {
                warn!(ticket_id = %ticket.id, error = %err,
                      "classification failed, continuing without analysis");
                None
            }
        };

        let analysis = match &suggestion {
            Some(suggestion) => {
                ctx.step("apply-classification", || {
                    let tickets = Arc::clone(&self.tickets);
                    let id = ticket.id.clone();
                    let analysis = Self::analysis_from(suggestion);
                    async move {
                        tickets.apply_analysis(&id, &analysis).await?;
                        Ok(analysis)
                    }
                })
                .await?
            }
            None => TicketAnalysis {
                priority: None,
                note: None,
                skills: Vec::new(),
            },
        };

        let assignee: Option<User> = ctx
            .step("assign-moderator", || {
                let tickets = Arc::clone(&self.tickets);
                let directory = Arc::clone(&self.directory);
                let id = ticket.id.clone();
                let skills = analysis.skills.clone();
                async move {
                    let moderators = directory.users_by_role(Role::Moderator).await?;
                    let admins = directory.users_by_role(Role::Admin).await?;
                    let chosen = select_assignee(&skills, &moderators, &admins);
                    tickets
                        .set_assignee(&id, chosen.as_ref().map(|u| &u.id))
                        .await?;
                    Ok(chosen)
                }
            })
            .await?;

        ctx.step("notify-assignee", || {
            let notifier = Arc::clone(&self.notifier);
            let tickets = Arc::clone(&self.tickets);
            let assignee = assignee.clone();
            let id = ticket.id.clone();
            async move {
                match assignee {
                    Some(user) => {
                        // Reload so the mail reflects the applied analysis.
                        let fresh = tickets.get(&id).await?;
                        let subject = format!("Ticket assigned: {}", fresh.title);
                        let body =
                            format!("You have been assigned ticket {}: {}", fresh.id, fresh.title);
                        send_best_effort(notifier.as_ref(), &user.email, &subject, &body).await;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        })
        .await?;

        Ok(match &assignee {
            Some(user) => format!("ticket {} assigned to {}", ticket.id, user.email),
            None => format!("ticket {} processed, no assignee available", ticket.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_priority_tokens_normalize_to_medium() {
        assert_eq!(normalize_priority("low"), Some(Priority::Medium));
        assert_eq!(normalize_priority("Medium"), Some(Priority::Medium));
        assert_eq!(normalize_priority("HIGH"), Some(Priority::Medium));
    }

    #[test]
    fn unrecognized_priority_tokens_stay_unset() {
        assert_eq!(normalize_priority("urgent"), None);
        assert_eq!(normalize_priority(""), None);
        assert_eq!(normalize_priority("p1"), None);
    }

    #[test]
    fn blank_notes_are_dropped() {
        let analysis = TicketPipeline::analysis_from(&TicketSuggestion {
            priority: "high".into(),
            note: "   ".into(),
            skills: vec!["networking".into()],
        });
        assert_eq!(analysis.priority, Some(Priority::Medium));
        assert!(analysis.note.is_none());
        assert_eq!(analysis.skills, vec!["networking".to_string()]);
    }
}
