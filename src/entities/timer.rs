//! # Periodic timer entity.
//!
//! A [`Timer`] fires its callback every `period`. Deadlines are tracked here;
//! the [`TimersManager`](crate::TimersManager) decides *when* to enqueue
//! a ready event and re-arms after each execution.
//!
//! ## Rules
//! - A canceled timer never runs its callback; [`Timer::reset`] re-enables it.
//! - Missed ticks are skipped: after a late execution the next deadline is the
//!   first multiple of `period` strictly in the future.
//! - At most one ready event per timer is pending on the executor queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::executable::Executable;
use super::wake::{EntityKey, EntityKind, WakeSlot};

type TimerCallback = Box<dyn Fn() + Send + Sync>;

struct TimerState {
    next_call: Instant,
    canceled: bool,
}

/// Periodic wall timer.
pub struct Timer {
    key: EntityKey,
    period: Duration,
    callback: TimerCallback,
    state: Mutex<TimerState>,
    pending: AtomicBool,
    slot: WakeSlot,
}

impl Timer {
    /// Creates a timer whose first deadline is `now + period`.
    pub fn new<F>(period: Duration, callback: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            key: EntityKey::next(),
            period,
            callback: Box::new(callback),
            state: Mutex::new(TimerState {
                next_call: Instant::now() + period,
                canceled: false,
            }),
            pending: AtomicBool::new(false),
            slot: WakeSlot::new(),
        })
    }

    /// Configured period.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stops the timer; pending ticks will not run the callback.
    pub fn cancel(&self) {
        self.lock().canceled = true;
        self.notify_ready();
    }

    /// True if [`cancel`](Self::cancel) was called since the last reset.
    pub fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    /// Restarts the period from now and clears the canceled state.
    pub fn reset(&self) {
        {
            let mut state = self.lock();
            state.canceled = false;
            state.next_call = Instant::now() + self.period;
        }
        self.notify_ready();
    }

    /// True if the deadline has passed and the timer is not canceled.
    pub fn is_ready(&self) -> bool {
        let state = self.lock();
        !state.canceled && Instant::now() >= state.next_call
    }

    /// Time left until the next deadline (`ZERO` if overdue, `None` if canceled).
    pub fn time_until_trigger(&self) -> Option<Duration> {
        let state = self.lock();
        if state.canceled {
            return None;
        }
        Some(state.next_call.saturating_duration_since(Instant::now()))
    }

    /// Next deadline, `None` if canceled.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        let state = self.lock();
        (!state.canceled).then_some(state.next_call)
    }

    /// Marks a ready event as queued; false if one already is.
    pub(crate) fn try_mark_pending(&self) -> bool {
        !self.pending.swap(true, AtomicOrdering::AcqRel)
    }

    #[inline]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(AtomicOrdering::Acquire)
    }

    /// Drops the queued marker without running (timer removed from the manager).
    pub(crate) fn clear_pending(&self) {
        self.pending.store(false, AtomicOrdering::Release);
    }

    /// Consumes the queued marker; false if it was already consumed or cleared.
    pub(crate) fn take_pending(&self) -> bool {
        self.pending.swap(false, AtomicOrdering::AcqRel)
    }

    fn advance(&self) -> bool {
        let mut state = self.lock();
        if state.canceled {
            return false;
        }
        let now = Instant::now();
        let late = now.saturating_duration_since(state.next_call);
        let period_ns = self.period.as_nanos().max(1);
        let skip = late.as_nanos() / period_ns + 1;
        let step = (period_ns * skip).min(u128::from(u64::MAX)) as u64;
        state.next_call += Duration::from_nanos(step);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Executable for Timer {
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Timer
    }

    fn wake_slot(&self) -> &WakeSlot {
        &self.slot
    }

    fn execute(&self) {
        self.clear_pending();
        if self.advance() {
            (self.callback)();
        }
        // Ask the manager to re-arm for the next deadline.
        self.notify_ready();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("key", &self.key)
            .field("period", &self.period)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
