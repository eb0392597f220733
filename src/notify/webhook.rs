//! Webhook reminder transport: POSTs a JSON [`ReminderMessage`].

use super::{Notifier, ReminderMessage};
use crate::error::EngineError;
use crate::goal::GoalSnapshot;
use async_trait::async_trait;
use tracing::debug;

/// Delivers reminders to an HTTP endpoint (mail relay, push gateway, ...).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
    sender: Option<String>,
}

impl WebhookNotifier {
    /// Notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the URL does not parse and
    /// [`EngineError::Notify`] when the HTTP client cannot be built.
    pub fn new(url: &str, sender: Option<String>) -> crate::Result<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| EngineError::Config(format!("invalid webhook url '{url}': {e}")))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::Notify(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            url,
            sender,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn id(&self) -> &'static str {
        "webhook"
    }

    async fn send_reminder(&self, contact: &str, snapshot: GoalSnapshot) -> crate::Result<()> {
        let message = ReminderMessage::new(contact, snapshot).with_sender(self.sender.as_deref());
        let response = self
            .client
            .post(self.url.clone())
            .json(&message)
            .send()
            .await
            .map_err(|e| EngineError::Notify(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Notify(format!(
                "webhook returned HTTP {status}"
            )));
        }
        debug!(url = %self.url, to = contact, "reminder delivered to webhook");
        Ok(())
    }
}
