//! Outbound notifications. Delivery is fire-and-forget: a failed push is
//! logged and never changes the run's outcome. A webhook that never answers
//! is abandoned after [`WEBHOOK_TIMEOUT`].

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Success,
    Alert,
}

pub trait Notifier: Send + Sync {
    fn push(&self, title: &str, body: &str, kind: NotifyKind);
}

/// Writes the notification to the log instead of sending it anywhere.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn push(&self, title: &str, body: &str, kind: NotifyKind) {
        match kind {
            NotifyKind::Success => info!(title, "{}", body),
            NotifyKind::Alert => warn!(title, "{}", body),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    content: &'a str,
    msg_type: &'static str,
    kind: NotifyKind,
}

pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// POSTs `{title, content, msg_type, kind}` as JSON to a webhook URL.
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::new_with_config(
        ureq::config::Config::builder()
            .timeout_global(Some(timeout))
            .build(),
    )
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        WebhookNotifier {
            url: url.trim().to_string(),
            agent: agent_with_timeout(WEBHOOK_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent_with_timeout(timeout);
        self
    }

    fn send(&self, payload: &WebhookPayload<'_>) -> Result<(), ureq::Error> {
        self.agent.post(&self.url).send_json(payload)?;
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn push(&self, title: &str, body: &str, kind: NotifyKind) {
        let payload = WebhookPayload {
            title,
            content: body,
            msg_type: "text",
            kind,
        };
        match self.send(&payload) {
            Ok(()) => info!(url = %self.url, title, "notification sent"),
            Err(e) => warn!(url = %self.url, error = %e, "notification delivery failed"),
        }
    }
}
