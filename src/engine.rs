//! Entry points used by goal-setting and activity-logging call sites.
//!
//! [`GoalEngine`] ties the goal store to the tracker registry: setting a goal
//! (re)starts reminders, crossing the goal upward signals completion, and
//! dropping back below the goal re-arms reminders.

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::EngineError;
use crate::goal::{GoalSnapshot, GoalTransition, UserId};
use crate::notify::Notifier;
use crate::store::GoalStore;
use crate::tracker::{TrackerRegistry, TrackerTicket};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Per-user async locks that serialize goal and points updates.
///
/// An entry lives only while someone holds or waits on it.
#[derive(Default)]
struct ProgressLocks {
    users: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl ProgressLocks {
    async fn acquire(self: &Arc<Self>, user_id: UserId) -> ProgressGuard {
        let lock = {
            let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(users.entry(user_id).or_default())
        };
        ProgressGuard {
            locks: Arc::clone(self),
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }
}

struct ProgressGuard {
    locks: Arc<ProgressLocks>,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        let mut users = self
            .locks
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Map entry plus our guard: nobody else is waiting.
        if users
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            users.remove(&self.user_id);
        }
        self.guard.take();
    }
}

/// Goal tracking facade.
#[derive(Clone)]
pub struct GoalEngine {
    registry: TrackerRegistry,
    store: Arc<dyn GoalStore>,
    clock: Arc<dyn Clock>,
    progress: Arc<ProgressLocks>,
}

impl GoalEngine {
    /// Engine reading the system wall clock.
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn GoalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_clock(config, store, notifier, Arc::new(SystemClock))
    }

    /// Engine with an explicit clock.
    pub fn with_clock(
        config: TrackerConfig,
        store: Arc<dyn GoalStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry =
            TrackerRegistry::with_clock(config, Arc::clone(&store), notifier, Arc::clone(&clock));
        Self {
            registry,
            store,
            clock,
            progress: Arc::default(),
        }
    }

    /// Tracker registry driven by this engine.
    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    /// Goal store shared with the trackers.
    pub fn store(&self) -> &Arc<dyn GoalStore> {
        &self.store
    }

    /// Today's date under the configured day boundary.
    pub fn today(&self) -> NaiveDate {
        self.clock.today(self.registry.config().day_boundary)
    }

    /// (Re)start reminders for a user who set a goal or fell back below it.
    pub fn start_or_restart_tracking(
        &self,
        user_id: UserId,
        contact: &str,
    ) -> crate::Result<TrackerTicket> {
        self.registry.start_tracking(user_id, contact)
    }

    /// Stop pending reminder cycles for a user who just reached their goal.
    pub fn signal_goal_completed(&self, user_id: UserId) -> bool {
        let signalled = self.registry.signal_goal_completed(user_id);
        if !signalled {
            debug!(user_id = %user_id, "goal completed with no active tracker");
        }
        signalled
    }

    /// Stop tracking a user regardless of goal state.
    pub fn stop_tracking(&self, user_id: UserId) -> bool {
        self.registry.stop_tracking(user_id)
    }

    /// Persist a goal for `day`, sync its completion flag, and (re)start tracking.
    ///
    /// # Errors
    ///
    /// Rejects non-positive goals; propagates store and scheduling errors.
    pub async fn set_goal(
        &self,
        user_id: UserId,
        contact: &str,
        day: NaiveDate,
        goal_points: i64,
    ) -> crate::Result<TrackerTicket> {
        if goal_points <= 0 {
            return Err(EngineError::Validation(format!(
                "goal points must be positive, got {goal_points}"
            )));
        }
        let _progress = self.progress.acquire(user_id).await;
        self.store.set_goal(user_id, day, goal_points).await?;
        let snapshot = self.store.read_goal_snapshot(user_id, day).await?;
        self.store
            .write_goal_completion_state(user_id, day, snapshot.is_completed())
            .await?;

        info!(user_id = %user_id, day = %day, goal_points, "productivity goal set");
        self.start_or_restart_tracking(user_id, contact)
    }

    /// React to a points change between `before` and `after`.
    ///
    /// Writes the new completion state on a crossing, then signals completion
    /// or re-arms tracking. A failed write leaves the tracker untouched.
    pub async fn apply_progress(
        &self,
        user_id: UserId,
        contact: &str,
        before: GoalSnapshot,
        after: GoalSnapshot,
    ) -> crate::Result<GoalTransition> {
        let day = self.today();
        let _progress = self.progress.acquire(user_id).await;
        self.apply_transition(user_id, contact, day, before, after)
            .await
    }

    /// Add `points` to today's total (negative to undo an activity) and
    /// apply the resulting goal transition.
    ///
    /// Calls for the same user are serialized, so each one classifies its
    /// transition against the total it actually changed.
    pub async fn record_points(
        &self,
        user_id: UserId,
        contact: &str,
        points: i64,
    ) -> crate::Result<(GoalSnapshot, GoalTransition)> {
        let day = self.today();
        let _progress = self.progress.acquire(user_id).await;
        let update = self.store.add_points(user_id, day, points).await?;
        let transition = self
            .apply_transition(user_id, contact, day, update.before, update.after)
            .await?;
        Ok((update.after, transition))
    }

    async fn apply_transition(
        &self,
        user_id: UserId,
        contact: &str,
        day: NaiveDate,
        before: GoalSnapshot,
        after: GoalSnapshot,
    ) -> crate::Result<GoalTransition> {
        let transition = GoalTransition::between(before, after);
        match transition {
            GoalTransition::Completed => {
                self.store
                    .write_goal_completion_state(user_id, day, true)
                    .await?;
                self.signal_goal_completed(user_id);
            }
            GoalTransition::Uncompleted => {
                self.store
                    .write_goal_completion_state(user_id, day, false)
                    .await?;
                self.start_or_restart_tracking(user_id, contact)?;
            }
            GoalTransition::Unchanged => {}
        }

        if transition != GoalTransition::Unchanged {
            info!(
                user_id = %user_id,
                transition = %transition,
                total_points = after.total_points,
                goal_points = after.goal_points,
                "goal state changed"
            );
        }
        Ok(transition)
    }

    /// Stop all trackers and wait for them to finish.
    pub async fn shutdown(&self) -> usize {
        self.registry.shutdown().await
    }
}
