//! Goal snapshot and transition types shared by the store, notifier and engine.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Identifier of a tracked user.
pub type UserId = uuid::Uuid;

/// Points totals for one user on one calendar day.
///
/// Read fresh from the goal store on every reminder cycle; never cached in
/// process-wide state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSnapshot {
    /// Points accumulated today.
    pub total_points: i64,
    /// Goal for today. Zero or less means no goal is set.
    pub goal_points: i64,
}

impl GoalSnapshot {
    /// Snapshot from raw totals. A `goal_points` of zero or less means no goal.
    pub fn new(total_points: i64, goal_points: i64) -> Self {
        Self {
            total_points,
            goal_points,
        }
    }

    /// Returns `true` when a goal is set for the day.
    pub fn has_goal(&self) -> bool {
        self.goal_points > 0
    }

    /// Returns `true` when a goal is set and the total has reached it.
    pub fn is_completed(&self) -> bool {
        self.has_goal() && self.total_points >= self.goal_points
    }

    /// Returns `true` when a goal is set and still out of reach.
    pub fn needs_reminder(&self) -> bool {
        self.has_goal() && self.total_points < self.goal_points
    }

    /// Points still missing to reach the goal (zero once completed).
    pub fn remaining(&self) -> i64 {
        (self.goal_points - self.total_points).max(0)
    }

    /// Total after adding `points`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when the sum does not fit in an `i64`.
    pub fn total_after(&self, points: i64) -> crate::Result<i64> {
        self.total_points.checked_add(points).ok_or_else(|| {
            EngineError::Validation(format!(
                "adding {points} points to a total of {} overflows",
                self.total_points
            ))
        })
    }
}

/// Snapshots on either side of one points change, read in the same store
/// critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsUpdate {
    pub before: GoalSnapshot,
    pub after: GoalSnapshot,
}

impl PointsUpdate {
    /// Goal transition caused by this update.
    pub fn transition(&self) -> GoalTransition {
        GoalTransition::between(self.before, self.after)
    }
}

/// How a user's goal state changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalTransition {
    /// The total crossed the goal upward.
    Completed,
    /// The total dropped back below a previously reached goal.
    Uncompleted,
    /// No crossing, or no goal set.
    Unchanged,
}

impl GoalTransition {
    /// Classify the change from `before` to `after`.
    ///
    /// Only the `after` goal decides whether a goal exists at all, so a goal
    /// set between the two reads is compared against the new threshold.
    pub fn between(before: GoalSnapshot, after: GoalSnapshot) -> Self {
        if !after.has_goal() {
            return Self::Unchanged;
        }
        let was_completed = before.total_points >= after.goal_points;
        match (was_completed, after.is_completed()) {
            (false, true) => Self::Completed,
            (true, false) => Self::Uncompleted,
            _ => Self::Unchanged,
        }
    }
}

impl std::fmt::Display for GoalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Uncompleted => write!(f, "uncompleted"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}
