//! Goal store: per-user, per-day goals and accumulated points.
//!
//! The engine only reads snapshots and writes goal/completion state through
//! [`GoalStore`]. Two backends are provided:
//!
//! - [`MemoryGoalStore`]: process-local map, used by tests and when no
//!   database path is configured.
//! - [`SqliteGoalStore`]: single SQLite file, queries run on the blocking pool.

pub mod memory;
pub(crate) mod schema;
pub mod sqlite;

pub use memory::MemoryGoalStore;
pub use sqlite::SqliteGoalStore;

use crate::config::StoreConfig;
use crate::goal::{GoalSnapshot, PointsUpdate, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Persistence contract for goals and points.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Totals for `user_id` on `day`. Missing rows read as zero.
    async fn read_goal_snapshot(&self, user_id: UserId, day: NaiveDate)
    -> crate::Result<GoalSnapshot>;

    /// Record whether the goal for `day` is currently completed.
    async fn write_goal_completion_state(
        &self,
        user_id: UserId,
        day: NaiveDate,
        completed: bool,
    ) -> crate::Result<()>;

    /// Set (or replace) the goal for `day`.
    async fn set_goal(&self, user_id: UserId, day: NaiveDate, goal_points: i64)
    -> crate::Result<()>;

    /// Add `points` (may be negative) to the day's total.
    ///
    /// The returned `before` and `after` snapshots are read in the same
    /// critical section as the write, so concurrent calls for one user each
    /// see their own change.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`](crate::EngineError::Validation)
    /// when the new total overflows; nothing is written in that case.
    async fn add_points(
        &self,
        user_id: UserId,
        day: NaiveDate,
        points: i64,
    ) -> crate::Result<PointsUpdate>;
}

/// Build the configured store backend.
pub fn build_store(config: &StoreConfig) -> crate::Result<Arc<dyn GoalStore>> {
    match &config.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using sqlite goal store");
            Ok(Arc::new(SqliteGoalStore::open(path)?))
        }
        None => {
            tracing::info!("using in-memory goal store");
            Ok(Arc::new(MemoryGoalStore::new()))
        }
    }
}
