//! Goalkeeper: daily productivity goal tracking and reminder engine.
//!
//! Users set a points goal for the day. While they are below it, a per-user
//! background tracker sends a reminder on a fixed interval (three hours by
//! default). Trackers are started when a goal is set, stopped when the goal
//! is reached, re-armed when the user drops back below it, and retire on
//! their own once the calendar day rolls over.
//!
//! # Architecture
//!
//! - **Engine** ([`GoalEngine`]): entry points for goal-setting and
//!   activity-logging call sites
//! - **Registry** ([`TrackerRegistry`]): at most one tracker task per user,
//!   each with its own cancellation signal
//! - **Store** ([`store::GoalStore`]): goals and points per user per day
//!   (in-memory or SQLite)
//! - **Notifier** ([`notify::Notifier`]): reminder delivery (log or webhook)
//! - **Clock** ([`clock::Clock`]): wall clock and calendar-day truncation

pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod goal;
pub mod notify;
pub mod store;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::EngineConfig;
pub use engine::GoalEngine;
pub use error::{EngineError, Result};
pub use goal::{GoalSnapshot, GoalTransition, PointsUpdate, UserId};
pub use tracker::{TrackerRegistry, TrackerTicket};
