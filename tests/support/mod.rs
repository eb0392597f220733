//! Helpers shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use goalkeeper::GoalSnapshot;
use goalkeeper::notify::Notifier;
use std::sync::Mutex;
use std::time::Duration;

pub const HOUR: Duration = Duration::from_secs(3600);

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid test timestamp")
}

/// Let spawned tasks run after a paused-clock advance.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let trackers react.
pub async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}

/// Notifier that records each send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, GoalSnapshot)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, GoalSnapshot)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send_reminder(&self, contact: &str, snapshot: GoalSnapshot) -> goalkeeper::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((contact.to_owned(), snapshot));
        Ok(())
    }
}

/// Notifier that never answers, for exercising the delivery timeout.
pub struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    fn id(&self) -> &'static str {
        "stalled"
    }

    async fn send_reminder(&self, _contact: &str, _snapshot: GoalSnapshot) -> goalkeeper::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}
