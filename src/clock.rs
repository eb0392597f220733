//! Wall-clock access and calendar-day truncation.
//!
//! Trackers compare calendar days, never elapsed durations, so a tracker
//! started late in the evening still rolls over at midnight. Which midnight
//! is decided once by [`DayBoundary`].

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Time zone used to truncate instants to calendar days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayBoundary {
    /// Server-local time zone.
    #[default]
    Local,
    /// UTC.
    Utc,
}

impl DayBoundary {
    /// Calendar day containing `instant`.
    pub fn day_of(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Utc => instant.date_naive(),
        }
    }
}

impl std::fmt::Display for DayBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Utc => write!(f, "utc"),
        }
    }
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar day under `boundary`.
    fn today(&self, boundary: DayBoundary) -> NaiveDate {
        boundary.day_of(self.now())
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock anchored to tokio's clock.
///
/// Reports `start + elapsed`, where `elapsed` is measured with
/// [`tokio::time::Instant`]. Under a paused runtime (`start_paused = true`)
/// advancing tokio time moves both the tracker timers and the calendar day
/// together. [`jump`](Self::jump) shifts the wall clock without touching
/// timers, which models a manual clock change.
#[derive(Debug)]
pub struct ManualClock {
    start: DateTime<Utc>,
    anchor: tokio::time::Instant,
    offset: Mutex<chrono::Duration>,
}

impl ManualClock {
    /// Clock reading `start` at the current tokio instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            anchor: tokio::time::Instant::now(),
            offset: Mutex::new(chrono::Duration::zero()),
        }
    }

    /// Shift the reported wall-clock time by `delta` (may be negative).
    pub fn jump(&self, delta: chrono::Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *offset += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let offset = *self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.start + elapsed + offset
    }
}
