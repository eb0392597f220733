//! The per-user reminder loop.
//!
//! A tracker waits on two things: its interval timer and its
//! [`CompletionSignal`]. Each timer fire is one reminder cycle. The loop ends
//! when the calendar day rolls past the tracker's reference day or when the
//! signal fires; both paths drop the timer before the registry slot is
//! released.

use super::registry::{RegistryInner, TimerGuard, TrackerDeps};
use super::signal::{CompletionSignal, StopReason};
use crate::goal::UserId;
use chrono::NaiveDate;
use std::sync::{Arc, Weak};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How a tracker task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerExit {
    /// The timer fired on a later calendar day than the reference day.
    DayRollover {
        reference_day: NaiveDate,
        current_day: NaiveDate,
    },
    /// The tracker's signal fired.
    Signalled(StopReason),
}

impl std::fmt::Display for TrackerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DayRollover { current_day, .. } => write!(f, "day rolled over to {current_day}"),
            Self::Signalled(reason) => write!(f, "{reason}"),
        }
    }
}

pub(crate) struct GoalTrackerTask {
    pub(crate) user_id: UserId,
    pub(crate) contact: String,
    pub(crate) generation: u64,
    pub(crate) reference_day: NaiveDate,
    pub(crate) first_tick: Instant,
    pub(crate) signal: CompletionSignal,
    pub(crate) deps: Arc<TrackerDeps>,
    pub(crate) registry: Weak<RegistryInner>,
    pub(crate) timer_guard: TimerGuard,
}

impl GoalTrackerTask {
    pub(crate) async fn run(self) -> TrackerExit {
        debug!(
            user_id = %self.user_id,
            generation = self.generation,
            reference_day = %self.reference_day,
            "goal tracker started"
        );

        let mut timer = tokio::time::interval_at(self.first_tick, self.deps.config.interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;
                reason = self.signal.fired() => break TrackerExit::Signalled(reason),
                _ = timer.tick() => {
                    let current_day = self.deps.clock.today(self.deps.config.day_boundary);
                    if current_day > self.reference_day {
                        break TrackerExit::DayRollover {
                            reference_day: self.reference_day,
                            current_day,
                        };
                    }
                    self.remind(current_day).await;
                }
            }
        };

        drop(timer);
        drop(self.timer_guard);
        if let Some(registry) = self.registry.upgrade() {
            registry.retire(self.user_id, self.generation);
        }

        info!(
            user_id = %self.user_id,
            generation = self.generation,
            reason = %exit,
            "goal tracker stopped"
        );
        exit
    }

    /// One reminder cycle. Every failure here is logged and skips the cycle only.
    async fn remind(&self, day: NaiveDate) {
        let snapshot = match self.deps.store.read_goal_snapshot(self.user_id, day).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    error = %e,
                    "cannot read goal snapshot, skipping reminder cycle"
                );
                return;
            }
        };

        // The goal may have been reached while the snapshot was in flight.
        if self.signal.is_fired() {
            return;
        }

        if !snapshot.needs_reminder() {
            debug!(
                user_id = %self.user_id,
                total_points = snapshot.total_points,
                goal_points = snapshot.goal_points,
                "goal met or unset, no reminder"
            );
            return;
        }

        let timeout = self.deps.config.notify_timeout();
        let send = self.deps.notifier.send_reminder(&self.contact, snapshot);
        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(())) => info!(
                user_id = %self.user_id,
                notifier = self.deps.notifier.id(),
                total_points = snapshot.total_points,
                goal_points = snapshot.goal_points,
                "goal reminder sent"
            ),
            Ok(Err(e)) => warn!(
                user_id = %self.user_id,
                notifier = self.deps.notifier.id(),
                error = %e,
                "goal reminder failed"
            ),
            Err(_) => warn!(
                user_id = %self.user_id,
                notifier = self.deps.notifier.id(),
                timeout_secs = timeout.as_secs(),
                "goal reminder timed out"
            ),
        }
    }
}
