//! The signup pipeline: welcome mail for a freshly registered user.

use std::sync::Arc;

use async_trait::async_trait;

use triage_core::domain::{StepError, StepResult, TriggerEvent, USER_SIGNED_UP};
use triage_core::engine::{Pipeline, StepContext};
use triage_core::Notifier;
use triage_state::DirectoryStore;

pub struct SignupPipeline {
    directory: Arc<dyn DirectoryStore>,
    notifier: Arc<dyn Notifier>,
}

impl SignupPipeline {
    pub fn new(directory: Arc<dyn DirectoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            directory,
            notifier,
        }
    }
}

#[async_trait]
impl Pipeline for SignupPipeline {
    fn id(&self) -> &'static str {
        USER_SIGNED_UP
    }

    async fn execute(&self, ctx: &StepContext, event: &TriggerEvent) -> StepResult<String> {
        let email = event
            .email()
            .ok_or(StepError::NotFound {
                entity: "user",
                id: "(missing email)".to_string(),
            })?
            .to_string();

        let user = ctx
            .step("get-user-by-email", || {
                let directory = Arc::clone(&self.directory);
                let email = email.clone();
                async move {
                    directory
                        .find_by_email(&email)
                        .await?
                        .ok_or(StepError::NotFound {
                            entity: "user",
                            id: email,
                        })
                }
            })
            .await?;

        // Unlike ticket notifications, the welcome mail is the point of
        // this run: a delivery failure fails the step and is retried.
        ctx.step("send-welcome-email", || {
            let notifier = Arc::clone(&self.notifier);
            let user = user.clone();
            async move {
                notifier
                    .notify(
                        &user.email,
                        "Welcome aboard",
                        &format!("Welcome to the helpdesk, {}!", user.email),
                    )
                    .await
                    .map_err(|e| StepError::transient(format!("welcome mail: {e}")))
            }
        })
        .await?;

        Ok(format!("welcomed {email}"))
    }
}
