//! Reminder delivery.
//!
//! Trackers hand a contact address and the goal snapshot they just read to a
//! [`Notifier`]. Delivery is fire-and-forget from the tracker's point of
//! view: errors come back as values so the tracker can log them, but they
//! never end the tracker.

pub mod webhook;

pub use webhook::WebhookNotifier;

use crate::config::{NotifierConfig, NotifierKind};
use crate::error::EngineError;
use crate::goal::GoalSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Subject line of every goal reminder.
pub const REMINDER_SUBJECT: &str = "Productivity Goal Reminder";

/// Outbound reminder contract. New transports only need to implement this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Stable transport identifier (e.g. `log`, `webhook`).
    fn id(&self) -> &'static str;

    /// Tell `contact` they are below their goal.
    async fn send_reminder(&self, contact: &str, snapshot: GoalSnapshot) -> crate::Result<()>;
}

/// Rendered reminder, as delivered to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub total_points: i64,
    pub goal_points: i64,
}

impl ReminderMessage {
    /// Reminder addressed to `contact` reporting `snapshot`'s totals.
    pub fn new(contact: &str, snapshot: GoalSnapshot) -> Self {
        let body = format!(
            "Hello,\n\n\
             You are currently below your productivity goal for the day.\n\
             Your total daily points: {}\n\
             Your goal points: {}\n\n\
             Keep pushing to reach your target!\n\n\
             Best regards,\n\
             Your Productivity Tracker",
            snapshot.total_points, snapshot.goal_points
        );
        Self {
            from: None,
            to: contact.to_owned(),
            subject: REMINDER_SUBJECT.to_owned(),
            body,
            total_points: snapshot.total_points,
            goal_points: snapshot.goal_points,
        }
    }

    /// Set the `from` address; `None` leaves it out of the payload.
    pub fn with_sender(mut self, sender: Option<&str>) -> Self {
        self.from = sender.map(str::to_owned);
        self
    }
}

/// Writes reminders to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn id(&self) -> &'static str {
        "log"
    }

    async fn send_reminder(&self, contact: &str, snapshot: GoalSnapshot) -> crate::Result<()> {
        let message = ReminderMessage::new(contact, snapshot);
        info!(
            to = %message.to,
            total_points = message.total_points,
            goal_points = message.goal_points,
            "{}",
            message.subject
        );
        Ok(())
    }
}

/// Build the configured notifier.
pub fn build_notifier(config: &NotifierConfig) -> crate::Result<Arc<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                EngineError::Config("notifier.webhook_url is required".to_owned())
            })?;
            Ok(Arc::new(WebhookNotifier::new(
                url,
                config.sender.clone(),
            )?))
        }
    }
}
