//! Per-user goal trackers.
//!
//! One tokio task per tracked user wakes on a fixed interval and sends a
//! reminder while the user is below their goal for the day. Tasks are
//! started, replaced and stopped through the [`TrackerRegistry`].

pub mod registry;
pub mod signal;
mod task;

pub use registry::{TrackerRegistry, TrackerTicket};
pub use signal::{CompletionSignal, StopReason};
pub use task::TrackerExit;
