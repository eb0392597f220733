//! Shared test doubles used across multiple test modules.

use crate::error::EngineError;
use crate::goal::{GoalSnapshot, PointsUpdate, UserId};
use crate::notify::Notifier;
use crate::store::GoalStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

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

/// Notifier that records every successful send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, GoalSnapshot)>>,
    fail_remaining: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, GoalSnapshot)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send_reminder(&self, contact: &str, snapshot: GoalSnapshot) -> crate::Result<()> {
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Notify("simulated transport failure".to_owned()));
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((contact.to_owned(), snapshot));
        Ok(())
    }
}

/// Store whose reads fail until [`heal`](Self::heal) provides a snapshot.
#[derive(Default)]
pub struct FailingStore {
    snapshot: Mutex<Option<GoalSnapshot>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heal(&self, snapshot: GoalSnapshot) {
        *self.snapshot.lock().expect("snapshot lock") = Some(snapshot);
    }

    fn current(&self) -> crate::Result<GoalSnapshot> {
        self.snapshot
            .lock()
            .expect("snapshot lock")
            .ok_or_else(|| EngineError::Store("store unavailable".to_owned()))
    }
}

#[async_trait]
impl GoalStore for FailingStore {
    async fn read_goal_snapshot(
        &self,
        _user_id: UserId,
        _day: NaiveDate,
    ) -> crate::Result<GoalSnapshot> {
        self.current()
    }

    async fn write_goal_completion_state(
        &self,
        _user_id: UserId,
        _day: NaiveDate,
        _completed: bool,
    ) -> crate::Result<()> {
        self.current().map(|_| ())
    }

    async fn set_goal(
        &self,
        _user_id: UserId,
        _day: NaiveDate,
        _goal_points: i64,
    ) -> crate::Result<()> {
        self.current().map(|_| ())
    }

    async fn add_points(
        &self,
        _user_id: UserId,
        _day: NaiveDate,
        _points: i64,
    ) -> crate::Result<PointsUpdate> {
        let snapshot = self.current()?;
        Ok(PointsUpdate {
            before: snapshot,
            after: snapshot,
        })
    }
}

/// In-memory store that yields to the scheduler before every call, so
/// concurrent engine calls interleave at each store access.
#[derive(Default)]
pub struct InterleavingStore {
    inner: crate::store::MemoryGoalStore,
    fail_completion_writes: std::sync::atomic::AtomicBool,
}

impl InterleavingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make completion-state writes fail from now on.
    pub fn fail_completion_writes(&self) {
        self.fail_completion_writes.store(true, Ordering::SeqCst);
    }

    pub fn record(&self, user_id: UserId, day: NaiveDate) -> Option<crate::store::memory::GoalRecord> {
        self.inner.record(user_id, day)
    }
}

#[async_trait]
impl GoalStore for InterleavingStore {
    async fn read_goal_snapshot(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> crate::Result<GoalSnapshot> {
        tokio::task::yield_now().await;
        self.inner.read_goal_snapshot(user_id, day).await
    }

    async fn write_goal_completion_state(
        &self,
        user_id: UserId,
        day: NaiveDate,
        completed: bool,
    ) -> crate::Result<()> {
        tokio::task::yield_now().await;
        if self.fail_completion_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Store("completion write rejected".to_owned()));
        }
        self.inner
            .write_goal_completion_state(user_id, day, completed)
            .await
    }

    async fn set_goal(
        &self,
        user_id: UserId,
        day: NaiveDate,
        goal_points: i64,
    ) -> crate::Result<()> {
        tokio::task::yield_now().await;
        self.inner.set_goal(user_id, day, goal_points).await
    }

    async fn add_points(
        &self,
        user_id: UserId,
        day: NaiveDate,
        points: i64,
    ) -> crate::Result<PointsUpdate> {
        tokio::task::yield_now().await;
        self.inner.add_points(user_id, day, points).await
    }
}
