//! # Ready-event queue feeding the dispatch core.
//!
//! A single FIFO of [`ReadyEvent`]s fed by wake callbacks (any thread) and
//! drained by dispatch workers.
//!
//! ## Rules
//! - `push` takes a short critical section and never waits.
//! - Structural events coalesce: a guard-condition signal already queued for
//!   the same key is not queued twice. Entity events are never deduplicated.
//! - `wait_pop` is cancel-safe: an event is only removed once it is returned.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::entities::ReadyEvent;

/// Multi-producer FIFO of ready events.
#[derive(Debug, Default)]
pub struct EventsQueue {
    items: Mutex<VecDeque<ReadyEvent>>,
    notify: Notify,
}

impl EventsQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `ev` and wakes one waiter.
    pub fn push(&self, ev: ReadyEvent) {
        {
            let mut items = self.lock();
            if ev.is_structural() && items.contains(&ev) {
                return;
            }
            items.push_back(ev);
        }
        self.notify.notify_one();
    }

    /// Removes the oldest event.
    pub fn pop(&self) -> Option<ReadyEvent> {
        self.lock().pop_front()
    }

    /// Oldest event, without removing it.
    pub fn front(&self) -> Option<ReadyEvent> {
        self.lock().front().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Takes every queued event, leaving the queue empty.
    pub fn take_all(&self) -> VecDeque<ReadyEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Puts unprocessed events back in front, preserving their order.
    pub fn requeue_front(&self, mut rest: VecDeque<ReadyEvent>) {
        if rest.is_empty() {
            return;
        }
        {
            let mut items = self.lock();
            rest.append(&mut items);
            *items = rest;
        }
        self.notify.notify_one();
    }

    /// Waits until an event is available and removes it.
    pub async fn wait_pop(&self) -> ReadyEvent {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking, so a push in between is not missed.
            notified.as_mut().enable();
            if let Some(ev) = self.pop() {
                if !self.is_empty() {
                    self.notify.notify_one();
                }
                return ev;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ReadyEvent>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::entities::{EntityKey, EntityKind};

    fn timer_event() -> ReadyEvent {
        ReadyEvent::entity(EntityKind::Timer, EntityKey::next())
    }

    #[test]
    fn fifo_order_and_no_entity_dedup() {
        let q = EventsQueue::new();
        let a = timer_event();
        let b = timer_event();
        q.push(a);
        q.push(b);
        q.push(a);
        assert_eq!(q.len(), 3);
        assert_eq!(q.front(), Some(a));
        assert_eq!(q.pop(), Some(a));
        assert_eq!(q.pop(), Some(b));
        assert_eq!(q.pop(), Some(a));
        assert!(q.is_empty());
    }

    #[test]
    fn structural_events_coalesce_while_queued() {
        let q = EventsQueue::new();
        let guard = ReadyEvent::structural(EntityKey::next());
        q.push(guard);
        q.push(guard);
        assert_eq!(q.len(), 1);
        q.pop();
        q.push(guard);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn requeue_front_preserves_order() {
        let q = EventsQueue::new();
        let (a, b, c) = (timer_event(), timer_event(), timer_event());
        q.push(a);
        q.push(b);
        let mut snapshot = q.take_all();
        assert!(q.is_empty());
        q.push(c);

        snapshot.pop_front();
        q.requeue_front(snapshot);
        assert_eq!(q.pop(), Some(b));
        assert_eq!(q.pop(), Some(c));
    }

    #[tokio::test]
    async fn wait_pop_wakes_on_push_from_another_thread() {
        let q = Arc::new(EventsQueue::new());
        let ev = timer_event();
        let q2 = q.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            q2.push(ev);
        });
        let got = tokio::time::timeout(Duration::from_secs(5), q.wait_pop())
            .await
            .unwrap();
        assert_eq!(got, ev);
    }
}
