//! In-memory goal store.

use super::GoalStore;
use crate::goal::{GoalSnapshot, PointsUpdate, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One user's goal row for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoalRecord {
    pub total_points: i64,
    pub goal_points: i64,
    pub completed: bool,
}

impl GoalRecord {
    fn snapshot(&self) -> GoalSnapshot {
        GoalSnapshot::new(self.total_points, self.goal_points)
    }
}

/// Goal store kept in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryGoalStore {
    records: Mutex<HashMap<(UserId, NaiveDate), GoalRecord>>,
}

impl MemoryGoalStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row for `user_id` on `day`, if any.
    pub fn record(&self, user_id: UserId, day: NaiveDate) -> Option<GoalRecord> {
        self.lock().get(&(user_id, day)).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(UserId, NaiveDate), GoalRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GoalStore for MemoryGoalStore {
    async fn read_goal_snapshot(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> crate::Result<GoalSnapshot> {
        Ok(self
            .lock()
            .get(&(user_id, day))
            .map(GoalRecord::snapshot)
            .unwrap_or_default())
    }

    async fn write_goal_completion_state(
        &self,
        user_id: UserId,
        day: NaiveDate,
        completed: bool,
    ) -> crate::Result<()> {
        self.lock().entry((user_id, day)).or_default().completed = completed;
        Ok(())
    }

    async fn set_goal(
        &self,
        user_id: UserId,
        day: NaiveDate,
        goal_points: i64,
    ) -> crate::Result<()> {
        self.lock().entry((user_id, day)).or_default().goal_points = goal_points;
        Ok(())
    }

    async fn add_points(
        &self,
        user_id: UserId,
        day: NaiveDate,
        points: i64,
    ) -> crate::Result<PointsUpdate> {
        let mut records = self.lock();
        let record = records.entry((user_id, day)).or_default();
        let before = record.snapshot();
        record.total_points = before.total_after(points)?;
        Ok(PointsUpdate {
            before,
            after: record.snapshot(),
        })
    }
}
