//! # Timers manager: turns timer deadlines into ready events.
//!
//! The collector hands timers to the manager instead of wiring them to the
//! queue directly. The manager owns each timer's wake slot and pushes a
//! [`ReadyEvent`] once a deadline passes.
//!
//! ## Architecture
//! ```text
//! run(token) driver task:
//!   loop {
//!     push_ready(now)         ─► queue.push(ReadyEvent{Timer, key}) for due, non-pending timers
//!     select! {
//!       token.cancelled()     ─► exit
//!       changed.notified()    ─► timer added/removed/reset/executed, recompute
//!       sleep_until(earliest) ─► next deadline reached
//!     }
//!   }
//! ```
//!
//! ## Rules
//! - At most one ready event per timer is queued (`Timer::try_mark_pending`).
//! - Pending timers do not count for the next wake-up; they re-arm after execution.
//! - Removing a timer clears its wake callback and its pending marker.

use std::collections::HashMap;
use std::future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::entities::{EntityKey, EntityKind, Executable, ReadyEvent, Timer};

use super::queue::EventsQueue;

/// Deadline tracker feeding timer events into the executor queue.
pub struct TimersManager {
    timers: Mutex<HashMap<EntityKey, Weak<Timer>>>,
    changed: Arc<Notify>,
    sink: Arc<EventsQueue>,
}

impl TimersManager {
    pub(crate) fn new(sink: Arc<EventsQueue>) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            changed: Arc::new(Notify::new()),
            sink,
        }
    }

    /// Starts tracking `timer`.
    pub fn add_timer(&self, timer: &Arc<Timer>) {
        let changed = Arc::clone(&self.changed);
        timer.set_wake_callback(Arc::new(move |_| changed.notify_one()));
        self.lock().insert(timer.key(), Arc::downgrade(timer));
        self.changed.notify_one();
    }

    /// Stops tracking `timer`; no event for it is pushed afterwards.
    pub fn remove_timer(&self, timer: &Arc<Timer>) {
        self.lock().remove(&timer.key());
        timer.clear_wake_callback();
        timer.clear_pending();
        self.changed.notify_one();
    }

    /// Stops tracking every timer.
    pub fn clear_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for timer in drained.into_iter().filter_map(|(_, w)| w.upgrade()) {
            timer.clear_wake_callback();
        }
        self.changed.notify_one();
    }

    /// Number of tracked, live timers.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues a ready event for every due timer that has none queued.
    ///
    /// Returns the number of events pushed.
    pub fn push_ready(&self, now: Instant) -> usize {
        let due: Vec<Arc<Timer>> = {
            let mut timers = self.lock();
            timers.retain(|_, w| w.strong_count() > 0);
            timers
                .values()
                .filter_map(Weak::upgrade)
                .filter(|t| t.deadline().is_some_and(|d| d <= now))
                .collect()
        };

        let mut pushed = 0;
        for timer in due {
            if timer.try_mark_pending() {
                self.sink
                    .push(ReadyEvent::entity(EntityKind::Timer, timer.key()));
                pushed += 1;
            }
        }
        pushed
    }

    /// Earliest deadline among timers with no event queued.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|t| !t.is_pending())
            .filter_map(|t| t.deadline())
            .min()
    }

    /// Drives deadlines until `token` is cancelled.
    pub(crate) async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            self.push_ready(Instant::now());
            let next = self.next_deadline();
            let sleep = async move {
                match next {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = token.cancelled() => break,
                _ = changed => {}
                _ = sleep => {}
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityKey, Weak<Timer>>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> (Arc<TimersManager>, Arc<EventsQueue>) {
        let queue = Arc::new(EventsQueue::new());
        (Arc::new(TimersManager::new(queue.clone())), queue)
    }

    #[tokio::test(start_paused = true)]
    async fn due_timer_is_queued_once() {
        let (mgr, queue) = manager();
        let timer = Timer::new(Duration::from_millis(10), || {});
        mgr.add_timer(&timer);

        assert_eq!(mgr.push_ready(Instant::now()), 0);
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(mgr.push_ready(Instant::now()), 1);
        assert_eq!(mgr.push_ready(Instant::now()), 0);
        assert_eq!(
            queue.pop(),
            Some(ReadyEvent::entity(EntityKind::Timer, timer.key()))
        );
        assert!(mgr.next_deadline().is_none());

        timer.execute();
        assert_eq!(
            mgr.next_deadline(),
            Some(Instant::now() + Duration::from_millis(10))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removed_timer_is_never_queued() {
        let (mgr, queue) = manager();
        let timer = Timer::new(Duration::from_millis(5), || {});
        mgr.add_timer(&timer);
        mgr.remove_timer(&timer);

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(mgr.push_ready(Instant::now()), 0);
        assert!(queue.is_empty());
        assert!(mgr.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn driver_pushes_on_deadline_and_stops_on_cancel() {
        let (mgr, queue) = manager();
        let timer = Timer::new(Duration::from_millis(50), || {});
        mgr.add_timer(&timer);

        let token = CancellationToken::new();
        let driver = tokio::spawn(mgr.clone().run(token.clone()));

        let ev = tokio::time::timeout(Duration::from_secs(1), queue.wait_pop())
            .await
            .unwrap();
        assert_eq!(ev.key, timer.key());

        token.cancel();
        driver.await.unwrap();
    }
}
