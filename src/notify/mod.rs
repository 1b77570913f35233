//! Best-effort analysis notifications.
//!
//! The pipeline reports `analysis_started`, `analysis_complete`, and
//! `analysis_error` events keyed by user. Delivery is fire-and-forget:
//! a notifier must never block the pipeline and its failures are
//! silently discarded; notifications sit outside the correctness
//! contract.

use serde::Serialize;
use std::time::Duration;

/// Maximum time a webhook POST may take before being abandoned.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(2);

/// Phase of an analysis lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPhase {
    AnalysisStarted,
    AnalysisComplete,
    AnalysisError,
}

/// Payload sent for each lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyEvent {
    pub phase: NotifyPhase,
    pub user_id: String,
    pub file_path: String,
    /// Quality score, present on completion events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
    /// Error summary, present on error events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at_millis: u64,
}

impl NotifyEvent {
    pub fn new(phase: NotifyPhase, user_id: &str, file_path: &str) -> Self {
        Self {
            phase,
            user_id: user_id.to_string(),
            file_path: file_path.to_string(),
            quality_score: None,
            error: None,
            at_millis: crate::models::result::now_millis(),
        }
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Sink for analysis lifecycle events.
pub trait Notifier: Send + Sync {
    /// Deliver an event. Must return promptly; implementations do any
    /// slow work on a spawned task.
    fn notify(&self, event: NotifyEvent);
}

/// Discards all events. The default when no webhook is configured.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: NotifyEvent) {}
}

/// POSTs each event as JSON to a configured endpoint.
///
/// Fire-and-forget: the POST runs on a spawned task and any error is
/// silently discarded.
pub struct WebhookNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: NotifyEvent) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            let _ = client.post(&endpoint).json(&event).send().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_phase_and_user() {
        let event = NotifyEvent::new(NotifyPhase::AnalysisComplete, "u1", "a.js").with_score(88);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "analysis_complete");
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["file_path"], "a.js");
        assert_eq!(json["quality_score"], 88);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_event_carries_summary() {
        let event =
            NotifyEvent::new(NotifyPhase::AnalysisError, "u1", "a.js").with_error("rate limited");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "analysis_error");
        assert_eq!(json["error"], "rate limited");
        assert!(json.get("quality_score").is_none());
    }

    #[test]
    fn noop_notifier_accepts_events() {
        NoopNotifier.notify(NotifyEvent::new(NotifyPhase::AnalysisStarted, "u1", "a.js"));
    }

    #[tokio::test]
    async fn webhook_notifier_does_not_panic_on_unreachable_url() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/unreachable");
        notifier.notify(NotifyEvent::new(NotifyPhase::AnalysisStarted, "u1", "a.js"));
        // Give the spawned task a moment to run and silently fail.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
