//! Notification capability.
//!
//! Notifications are fire-and-forget: delivery failures are logged, never
//! escalated to the caller's transaction. [`HttpNotifier`] posts to a mail
//! API; [`LogNotifier`] only writes a log line and is the default when no
//! mail endpoint is configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

/// Errors from a notification attempt.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail request failed: {0}")]
    Request(String),

    #[error("mail API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Opaque notification capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification to `to`.
    async fn notify(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Send a notification, swallowing and logging any failure.
///
/// This is the fire-and-forget path: the caller's outcome must never depend
/// on mail delivery.
pub async fn send_best_effort(notifier: &dyn Notifier, to: &str, subject: &str, body: &str) {
    match notifier.notify(to, subject, body).await {
        Ok(()) => info!(to = %to, subject = %subject, "notification sent"),
        Err(e) => warn!(to = %to, subject = %subject, error = %e, "notification failed (ignored)"),
    }
}

// ---------------------------------------------------------------------------
// HttpNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Notifier backed by an HTTP mail API (JSON POST, bearer token).
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
    token: String,
    from: String,
}

impl HttpNotifier {
    pub fn new(url: String, token: String, from: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            url,
            token,
            from,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let request = MailRequest {
            from: &self.from,
            to,
            subject,
            text: body,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Notifier that only logs. Default when no mail endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(to = %to, subject = %subject, body = %body, "notification (log only)");
        Ok(())
    }
}

/// Build the notifier named by the `TRIAGE_MAIL_*` environment variables.
///
/// With `TRIAGE_MAIL_URL` set, an [`HttpNotifier`] using `TRIAGE_MAIL_TOKEN`
/// and `TRIAGE_MAIL_FROM` (default `triage@localhost`). Without it, the
/// log-only [`LogNotifier`].
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match std::env::var("TRIAGE_MAIL_URL") {
        Ok(url) => {
            let token = std::env::var("TRIAGE_MAIL_TOKEN").unwrap_or_default();
            let from =
                std::env::var("TRIAGE_MAIL_FROM").unwrap_or_else(|_| "triage@localhost".to_string());
            info!(url = %url, from = %from, "using HTTP notifier");
            Arc::new(HttpNotifier::new(url, token, from))
        }
        Err(_) => {
            info!("TRIAGE_MAIL_URL unset, notifications go to the log");
            Arc::new(LogNotifier::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingNotifier {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Request("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let notifier = FailingNotifier {
            calls: AtomicU32::new(0),
        };
        // Must not panic or propagate.
        send_best_effort(&notifier, "mod@triage.dev", "Ticket assigned", "body").await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let result = LogNotifier::new()
            .notify("mod@triage.dev", "subject", "body")
            .await;
        assert!(result.is_ok());
    }
}
