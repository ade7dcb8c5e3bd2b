//! Ticket classification capability.
//!
//! The classifier is an opaque, injected capability: given ticket text, it
//! returns a structured suggestion (priority token, remediation note, skill
//! tags). [`HttpClassifier`] talks to an OpenAI-compatible chat-completions
//! endpoint; [`KeywordClassifier`] is a deterministic offline fallback used
//! when no endpoint is configured, and in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Structured suggestion returned by a classifier.
///
/// `priority` is kept as the raw token the classifier produced; the
/// pipeline owns the normalization policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketSuggestion {
    pub priority: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Errors from a classifier call. All variants are treated as transient by
/// the pipeline: the call is read-only and safe to repeat.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier call timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("classifier returned malformed output: {0}")]
    Malformed(String),
}

/// Opaque classification capability.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Analyze ticket text and return a structured suggestion.
    async fn classify(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketSuggestion, ClassifierError>;
}

// ---------------------------------------------------------------------------
// HttpClassifier: OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are a support-ticket triage assistant. \
Given a ticket title and description, respond with a JSON object with \
exactly these fields: \"priority\" (one of \"low\", \"medium\", \"high\"), \
\"note\" (a short remediation note for the assignee), and \"skills\" (an \
array of technical skill tags needed to resolve the ticket). Respond with \
JSON only.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpClassifier {
    /// Create a classifier for the given endpoint.
    ///
    /// `url` is the full chat-completions URL. `timeout` bounds the whole
    /// call; expiry surfaces as [`ClassifierError::Timeout`].
    pub fn new(url: String, api_key: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            url,
            api_key,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketSuggestion, ClassifierError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Title: {title}\n\nDescription: {description}"),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let send = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout))?
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ClassifierError::Malformed("empty choices".to_string()))?;

        debug!(content = %content, "classifier raw output");

        serde_json::from_str(content).map_err(|e| ClassifierError::Malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// KeywordClassifier: deterministic offline fallback
// ---------------------------------------------------------------------------

/// Keyword tables for the offline classifier.
const SKILL_KEYWORDS: &[(&str, &str)] = &[
    ("vpn", "networking"),
    ("network", "networking"),
    ("dns", "networking"),
    ("wifi", "networking"),
    ("password", "accounts"),
    ("login", "accounts"),
    ("account", "accounts"),
    ("disk", "hardware"),
    ("laptop", "hardware"),
    ("printer", "hardware"),
    ("email", "mail"),
    ("mail", "mail"),
    ("deploy", "devops"),
    ("build", "devops"),
    ("pipeline", "devops"),
    ("database", "databases"),
    ("sql", "databases"),
];

const HIGH_KEYWORDS: &[&str] = &["broken", "cannot", "down", "urgent", "outage", "blocked"];
const MEDIUM_KEYWORDS: &[&str] = &["error", "fail", "slow", "intermittent"];

/// Rule-based classifier used when no LLM endpoint is configured.
///
/// Deterministic: same text always yields the same suggestion.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        title: &str,
        description: &str,
    ) -> Result<TicketSuggestion, ClassifierError> {
        let text = format!("{title} {description}").to_lowercase();

        let mut skills: Vec<String> = Vec::new();
        for (keyword, skill) in SKILL_KEYWORDS {
            if text.contains(keyword) && !skills.iter().any(|s| s == skill) {
                skills.push((*skill).to_string());
            }
        }

        let priority = if HIGH_KEYWORDS.iter().any(|k| text.contains(k)) {
            "high"
        } else if MEDIUM_KEYWORDS.iter().any(|k| text.contains(k)) {
            "medium"
        } else {
            "low"
        };

        let note = if skills.is_empty() {
            "No matching runbook; route to a generalist.".to_string()
        } else {
            format!("Likely involves: {}.", skills.join(", "))
        };

        Ok(TicketSuggestion {
            priority: priority.to_string(),
            note,
            skills,
        })
    }
}

/// Build the classifier named by the `TRIAGE_CLASSIFIER_*` environment
/// variables.
///
/// With `TRIAGE_CLASSIFIER_URL` set, an [`HttpClassifier`] using
/// `TRIAGE_CLASSIFIER_KEY`, `TRIAGE_CLASSIFIER_MODEL` (default
/// `gpt-4o-mini`), and `TRIAGE_CLASSIFIER_TIMEOUT_SECS` (default 30).
/// Without it, the offline [`KeywordClassifier`].
pub fn classifier_from_env() -> Arc<dyn Classifier> {
    match std::env::var("TRIAGE_CLASSIFIER_URL") {
        Ok(url) => {
            let api_key = std::env::var("TRIAGE_CLASSIFIER_KEY").unwrap_or_default();
            let model = std::env::var("TRIAGE_CLASSIFIER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let timeout_secs = std::env::var("TRIAGE_CLASSIFIER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30);
            info!(url = %url, model = %model, timeout_secs, "using HTTP classifier");
            Arc::new(HttpClassifier::new(
                url,
                api_key,
                model,
                Duration::from_secs(timeout_secs),
            ))
        }
        Err(_) => {
            info!("TRIAGE_CLASSIFIER_URL unset, using keyword classifier");
            Arc::new(KeywordClassifier::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_classifier_is_deterministic() {
        let classifier = KeywordClassifier::new();
        let a = classifier
            .classify("VPN broken", "Cannot connect to VPN")
            .await
            .unwrap();
        let b = classifier
            .classify("VPN broken", "Cannot connect to VPN")
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn keyword_classifier_derives_skills_and_priority() {
        let suggestion = KeywordClassifier::new()
            .classify("VPN broken", "Cannot connect to VPN")
            .await
            .unwrap();
        assert_eq!(suggestion.priority, "high");
        assert_eq!(suggestion.skills, vec!["networking".to_string()]);
    }

    #[tokio::test]
    async fn keyword_classifier_defaults_to_low() {
        let suggestion = KeywordClassifier::new()
            .classify("Question", "How do I request a new monitor?")
            .await
            .unwrap();
        assert_eq!(suggestion.priority, "low");
    }

    #[test]
    fn suggestion_tolerates_missing_fields() {
        let suggestion: TicketSuggestion =
            serde_json::from_str(r#"{"priority": "high"}"#).unwrap();
        assert_eq!(suggestion.priority, "high");
        assert!(suggestion.skills.is_empty());
        assert!(suggestion.note.is_empty());
    }
}
