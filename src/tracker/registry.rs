//! Process-wide registry of per-user goal trackers.
//!
//! The registry owns one slot per tracked user. A slot holds the tracker's
//! generation number, its [`CompletionSignal`] and the join handle of its
//! task. The slot map is guarded by a `std::sync::Mutex` that is held only for
//! the map operation itself, never across an `.await`.
//!
//! Generations make self-removal safe: a finishing task only removes the slot
//! if it still carries that task's generation, so a superseded tracker can
//! never evict its replacement.

use super::signal::{CompletionSignal, StopReason};
use super::task::{GoalTrackerTask, TrackerExit};
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::EngineError;
use crate::goal::UserId;
use crate::notify::Notifier;
use crate::store::GoalStore;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Collaborators shared by every tracker task.
pub(crate) struct TrackerDeps {
    pub(crate) config: TrackerConfig,
    pub(crate) store: Arc<dyn GoalStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock>,
    live_timers: Arc<AtomicUsize>,
}

/// Counts one live interval timer for as long as it is held.
pub(crate) struct TimerGuard {
    live_timers: Arc<AtomicUsize>,
}

impl TimerGuard {
    fn new(live_timers: &Arc<AtomicUsize>) -> Self {
        live_timers.fetch_add(1, Ordering::SeqCst);
        Self {
            live_timers: Arc::clone(live_timers),
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.live_timers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Identity of one started tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerTicket {
    pub user_id: UserId,
    /// Monotonic per-registry counter; a restart always gets a larger value.
    pub generation: u64,
    /// Calendar day the tracker was started on.
    pub reference_day: NaiveDate,
}

struct TrackerSlot {
    generation: u64,
    contact: String,
    reference_day: NaiveDate,
    signal: CompletionSignal,
    handle: JoinHandle<TrackerExit>,
}

#[derive(Default)]
struct Slots {
    trackers: HashMap<UserId, TrackerSlot>,
    closed: bool,
}

pub(crate) struct RegistryInner {
    slots: Mutex<Slots>,
    next_generation: AtomicU64,
    deps: Arc<TrackerDeps>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the slot for `user_id` if it still belongs to `generation`.
    pub(crate) fn retire(&self, user_id: UserId, generation: u64) -> bool {
        let mut slots = self.lock();
        match slots.trackers.get(&user_id) {
            Some(slot) if slot.generation == generation => {
                slots.trackers.remove(&user_id);
                true
            }
            _ => false,
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.trackers.values() {
            slot.signal.fire(StopReason::Shutdown);
        }
    }
}

/// Shared handle to the tracker registry. Cloning is cheap.
#[derive(Clone)]
pub struct TrackerRegistry {
    inner: Arc<RegistryInner>,
}

impl TrackerRegistry {
    /// Create a registry that reads the system wall clock.
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn GoalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_clock(config, store, notifier, Arc::new(SystemClock))
    }

    /// Create a registry with an explicit clock.
    pub fn with_clock(
        config: TrackerConfig,
        store: Arc<dyn GoalStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let deps = TrackerDeps {
            config,
            store,
            notifier,
            clock,
            live_timers: Arc::new(AtomicUsize::new(0)),
        };
        Self {
            inner: Arc::new(RegistryInner {
                slots: Mutex::new(Slots::default()),
                next_generation: AtomicU64::new(0),
                deps: Arc::new(deps),
            }),
        }
    }

    /// Tracker timing shared by every task.
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.deps.config
    }

    /// (Re)start reminder tracking for `user_id`.
    ///
    /// Any tracker already running for the user is signalled and replaced in
    /// the same critical section that installs the new one. The first reminder
    /// cycle runs one full interval from now.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scheduling`] when called outside a tokio runtime,
    /// after [`shutdown`](Self::shutdown), or when the configured interval is
    /// zero or too large to schedule.
    pub fn start_tracking(&self, user_id: UserId, contact: &str) -> crate::Result<TrackerTicket> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Scheduling(format!("no async runtime available: {e}")))?;

        let deps = &self.inner.deps;
        if deps.config.interval_secs == 0 {
            return Err(EngineError::Scheduling(
                "tracker interval must be greater than zero".to_owned(),
            ));
        }
        let first_tick = tokio::time::Instant::now()
            .checked_add(deps.config.interval())
            .ok_or_else(|| {
                EngineError::Scheduling(format!(
                    "tracker interval of {}s is out of range",
                    deps.config.interval_secs
                ))
            })?;
        let reference_day = deps.clock.today(deps.config.day_boundary);
        let signal = CompletionSignal::new();

        let mut slots = self.inner.lock();
        if slots.closed {
            return Err(EngineError::Scheduling(
                "tracker registry is shut down".to_owned(),
            ));
        }
        // Allocated under the lock so insertion order matches generation order.
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(previous) = slots.trackers.remove(&user_id) {
            previous.signal.fire(StopReason::Superseded);
            debug!(
                user_id = %user_id,
                previous_generation = previous.generation,
                generation,
                "superseding goal tracker"
            );
        }

        let task = GoalTrackerTask {
            user_id,
            contact: contact.to_owned(),
            generation,
            reference_day,
            first_tick,
            signal: signal.clone(),
            deps: Arc::clone(deps),
            registry: Arc::downgrade(&self.inner),
            timer_guard: TimerGuard::new(&deps.live_timers),
        };
        let handle = runtime.spawn(task.run());

        slots.trackers.insert(
            user_id,
            TrackerSlot {
                generation,
                contact: contact.to_owned(),
                reference_day,
                signal,
                handle,
            },
        );
        drop(slots);

        info!(
            user_id = %user_id,
            generation,
            reference_day = %reference_day,
            interval_secs = deps.config.interval_secs,
            "goal tracking started"
        );

        Ok(TrackerTicket {
            user_id,
            generation,
            reference_day,
        })
    }

    /// Stop the user's tracker, if any. Safe to call repeatedly.
    pub fn stop_tracking(&self, user_id: UserId) -> bool {
        self.retire_with(user_id, StopReason::Stopped)
    }

    /// Halt the user's pending reminder cycles because the goal was reached.
    ///
    /// Returns `true` when a tracker was running for the user. Never blocks.
    pub fn signal_goal_completed(&self, user_id: UserId) -> bool {
        self.retire_with(user_id, StopReason::GoalCompleted)
    }

    fn retire_with(&self, user_id: UserId, reason: StopReason) -> bool {
        let removed = self.inner.lock().trackers.remove(&user_id);
        match removed {
            Some(slot) => {
                slot.signal.fire(reason);
                debug!(
                    user_id = %user_id,
                    generation = slot.generation,
                    reason = %reason,
                    "goal tracker retired"
                );
                true
            }
            None => false,
        }
    }

    /// Returns `true` while a tracker is registered for `user_id`.
    pub fn is_tracking(&self, user_id: UserId) -> bool {
        self.inner.lock().trackers.contains_key(&user_id)
    }

    /// Number of registered trackers.
    pub fn active_count(&self) -> usize {
        self.inner.lock().trackers.len()
    }

    /// Number of tracker timers still alive, including trackers that were
    /// retired but whose task has not finished unwinding yet.
    pub fn live_timers(&self) -> usize {
        self.inner.deps.live_timers.load(Ordering::SeqCst)
    }

    /// Identity of the user's current tracker, if any.
    pub fn ticket(&self, user_id: UserId) -> Option<TrackerTicket> {
        self.inner
            .lock()
            .trackers
            .get(&user_id)
            .map(|slot| TrackerTicket {
                user_id,
                generation: slot.generation,
                reference_day: slot.reference_day,
            })
    }

    /// Calendar day the user's current tracker was started on.
    pub fn reference_day(&self, user_id: UserId) -> Option<NaiveDate> {
        self.inner
            .lock()
            .trackers
            .get(&user_id)
            .map(|slot| slot.reference_day)
    }

    /// Contact address the user's tracker sends reminders to.
    pub fn contact(&self, user_id: UserId) -> Option<String> {
        self.inner
            .lock()
            .trackers
            .get(&user_id)
            .map(|slot| slot.contact.clone())
    }

    /// Users with a registered tracker, in no particular order.
    pub fn tracked_users(&self) -> Vec<UserId> {
        self.inner.lock().trackers.keys().copied().collect()
    }

    /// Stop every tracker, refuse further starts, and wait for the tasks to end.
    ///
    /// Returns the number of trackers that were running.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(UserId, TrackerSlot)> = {
            let mut slots = self.inner.lock();
            slots.closed = true;
            slots.trackers.drain().collect()
        };

        let count = drained.len();
        for (_, slot) in &drained {
            slot.signal.fire(StopReason::Shutdown);
        }
        for (user_id, slot) in drained {
            if let Err(e) = slot.handle.await {
                warn!(user_id = %user_id, error = %e, "goal tracker task failed during shutdown");
            }
        }

        info!(trackers = count, "tracker registry shut down");
        count
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::clock::{DayBoundary, ManualClock};
    use crate::goal::GoalSnapshot;
    use crate::store::MemoryGoalStore;
    use crate::test_utils::{FailingStore, RecordingNotifier, settle, utc};
    use chrono::{Local, TimeZone, Utc};
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    struct Fixture {
        registry: TrackerRegistry,
        store: Arc<MemoryGoalStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryGoalStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::starting_at(utc(2026, 3, 14, 9, 0)));
        let config = TrackerConfig {
            interval_secs: 3 * 3600,
            notify_timeout_secs: 5,
            day_boundary: DayBoundary::Utc,
        };
        let registry = TrackerRegistry::with_clock(
            config,
            store.clone(),
            notifier.clone(),
            clock,
        );
        Fixture {
            registry,
            store,
            notifier,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn start_outside_runtime_is_a_scheduling_error() {
        let f = fixture();
        let err = f
            .registry
            .start_tracking(UserId::new_v4(), "a@b.c")
            .unwrap_err();
        assert!(matches!(err, EngineError::Scheduling(_)));
        assert_eq!(f.registry.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unschedulable_interval_is_rejected_up_front() {
        for interval_secs in [0, u64::MAX] {
            let registry = TrackerRegistry::with_clock(
                TrackerConfig {
                    interval_secs,
                    notify_timeout_secs: 5,
                    day_boundary: DayBoundary::Utc,
                },
                Arc::new(MemoryGoalStore::new()),
                Arc::new(RecordingNotifier::new()),
                Arc::new(ManualClock::starting_at(utc(2026, 3, 14, 9, 0))),
            );
            let user = UserId::new_v4();

            let err = registry.start_tracking(user, "ada@example.com").unwrap_err();
            assert!(matches!(err, EngineError::Scheduling(_)), "{interval_secs}");
            settle().await;
            assert!(!registry.is_tracking(user));
            assert_eq!(registry.live_timers(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_day_boundary_rolls_over_at_local_midnight() {
        let store = Arc::new(MemoryGoalStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let start = Local
            .with_ymd_and_hms(2026, 6, 1, 22, 30, 0)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc);
        let registry = TrackerRegistry::with_clock(
            TrackerConfig {
                interval_secs: 3600,
                notify_timeout_secs: 5,
                day_boundary: DayBoundary::Local,
            },
            store.clone(),
            notifier.clone(),
            Arc::new(ManualClock::starting_at(start)),
        );
        let user = UserId::new_v4();
        let local_day = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        store.set_goal(user, local_day, 100).await.unwrap();

        let ticket = registry.start_tracking(user, "ada@example.com").unwrap();
        assert_eq!(ticket.reference_day, local_day);
        settle().await;

        // 23:30 local: still the reference day.
        tokio::time::advance(HOUR).await;
        settle().await;
        assert_eq!(notifier.count(), 1);
        assert!(registry.is_tracking(user));

        // 00:30 local: the next day, no reminder.
        tokio::time::advance(HOUR).await;
        settle().await;
        assert_eq!(notifier.count(), 1);
        assert!(!registry.is_tracking(user));
        assert_eq!(registry.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_records_reference_day_and_contact() {
        let f = fixture();
        let user = UserId::new_v4();
        let ticket = f.registry.start_tracking(user, "ada@example.com").unwrap();

        assert_eq!(ticket.reference_day, day());
        assert_eq!(f.registry.ticket(user), Some(ticket));
        assert_eq!(f.registry.reference_day(user), Some(day()));
        assert_eq!(f.registry.contact(user).as_deref(), Some("ada@example.com"));
        assert_eq!(f.registry.tracked_users(), vec![user]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_reminder_before_first_interval() {
        let f = fixture();
        let user = UserId::new_v4();
        f.store.set_goal(user, day(), 100).await.unwrap();
        f.registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;

        tokio::time::advance(3 * HOUR - Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(f.notifier.count(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(f.notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_tracker() {
        let f = fixture();
        let user = UserId::new_v4();
        f.store.set_goal(user, day(), 100).await.unwrap();

        let first = f.registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;
        tokio::time::advance(HOUR).await;
        let second = f.registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;

        assert!(second.generation > first.generation);
        assert_eq!(f.registry.active_count(), 1);
        assert_eq!(f.registry.live_timers(), 1);
        assert_eq!(f.registry.ticket(user).unwrap().generation, second.generation);

        // The first tracker would have fired at +3h.
        tokio::time::advance(2 * HOUR).await;
        settle().await;
        assert_eq!(f.notifier.count(), 0);

        // The second fires at +4h.
        tokio::time::advance(HOUR).await;
        settle().await;
        assert_eq!(f.notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_scoped_to_one_user() {
        let f = fixture();
        let a = UserId::new_v4();
        let b = UserId::new_v4();
        f.registry.start_tracking(a, "a@example.com").unwrap();
        f.registry.start_tracking(b, "b@example.com").unwrap();

        assert!(f.registry.stop_tracking(a));
        assert!(!f.registry.stop_tracking(a));
        settle().await;

        assert!(!f.registry.is_tracking(a));
        assert!(f.registry.is_tracking(b));
        assert_eq!(f.registry.live_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_signal_only_stops_the_target_user() {
        let f = fixture();
        let a = UserId::new_v4();
        let b = UserId::new_v4();
        f.store.set_goal(a, day(), 100).await.unwrap();
        f.store.set_goal(b, day(), 100).await.unwrap();
        f.registry.start_tracking(a, "a@example.com").unwrap();
        f.registry.start_tracking(b, "b@example.com").unwrap();
        settle().await;

        assert!(f.registry.signal_goal_completed(a));
        assert!(!f.registry.signal_goal_completed(a));
        settle().await;
        assert_eq!(f.registry.live_timers(), 1);

        tokio::time::advance(3 * HOUR).await;
        settle().await;
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "b@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn day_rollover_ends_tracker_without_reminder() {
        let f = fixture();
        let user = UserId::new_v4();
        f.store.set_goal(user, day(), 100).await.unwrap();
        f.registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;

        // 09:00 + 5 * 3h = 00:00 next day. The fifth fire is the rollover.
        for _ in 0..4 {
            tokio::time::advance(3 * HOUR).await;
            settle().await;
        }
        assert_eq!(f.notifier.count(), 4);
        assert!(f.registry.is_tracking(user));

        tokio::time::advance(3 * HOUR).await;
        settle().await;
        assert_eq!(f.notifier.count(), 4);
        assert!(!f.registry.is_tracking(user));
        assert_eq!(f.registry.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_goal_skips_reminder_but_keeps_tracking() {
        let f = fixture();
        let user = UserId::new_v4();
        f.store.set_goal(user, day(), 100).await.unwrap();
        f.store.add_points(user, day(), 150).await.unwrap();
        f.registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;

        tokio::time::advance(3 * HOUR).await;
        settle().await;
        assert_eq!(f.notifier.count(), 0);
        assert!(f.registry.is_tracking(user));
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_skips_cycle_and_task_survives() {
        let notifier = Arc::new(RecordingNotifier::new());
        let store = Arc::new(FailingStore::new());
        let registry = TrackerRegistry::with_clock(
            TrackerConfig {
                interval_secs: 3600,
                notify_timeout_secs: 5,
                day_boundary: DayBoundary::Utc,
            },
            store.clone(),
            notifier.clone(),
            Arc::new(ManualClock::starting_at(utc(2026, 3, 14, 9, 0))),
        );
        let user = UserId::new_v4();
        registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;

        tokio::time::advance(HOUR).await;
        settle().await;
        assert_eq!(notifier.count(), 0);
        assert!(registry.is_tracking(user));

        store.heal(GoalSnapshot::new(10, 100));
        tokio::time::advance(HOUR).await;
        settle().await;
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn notifier_failure_does_not_stop_tracker() {
        let f = fixture();
        let user = UserId::new_v4();
        f.store.set_goal(user, day(), 100).await.unwrap();
        f.notifier.fail_next(1);
        f.registry.start_tracking(user, "ada@example.com").unwrap();
        settle().await;

        tokio::time::advance(3 * HOUR).await;
        settle().await;
        assert_eq!(f.notifier.count(), 0);
        assert!(f.registry.is_tracking(user));

        tokio::time::advance(3 * HOUR).await;
        settle().await;
        assert_eq!(f.notifier.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_and_refuses_new_trackers() {
        let f = fixture();
        for _ in 0..3 {
            f.registry
                .start_tracking(UserId::new_v4(), "x@example.com")
                .unwrap();
        }
        assert_eq!(f.registry.shutdown().await, 3);
        assert_eq!(f.registry.active_count(), 0);
        assert_eq!(f.registry.live_timers(), 0);

        let err = f
            .registry
            .start_tracking(UserId::new_v4(), "x@example.com")
            .unwrap_err();
        assert!(matches!(err, EngineError::Scheduling(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_restarts_leave_one_tracker() {
        let f = fixture();
        let user = UserId::new_v4();

        let mut joins = Vec::new();
        for _ in 0..32 {
            let registry = f.registry.clone();
            joins.push(tokio::spawn(async move {
                registry.start_tracking(user, "ada@example.com").unwrap()
            }));
        }
        let mut max_generation = 0;
        for join in joins {
            max_generation = max_generation.max(join.await.unwrap().generation);
        }

        assert_eq!(f.registry.active_count(), 1);
        assert_eq!(
            f.registry.ticket(user).unwrap().generation,
            max_generation
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while f.registry.live_timers() > 1 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.registry.live_timers(), 1);
    }
}
