//! # Runtime events emitted by the executor and its collector.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Structural events**: node association and entity rebuilds
//! - **Scheduling events**: spin lifecycle and cancellation
//! - **Diagnostic events**: stale ready signals, subscriber overflow/panic
//!
//! The [`Event`] struct carries additional metadata such as timestamps, node
//! name, entity key and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use spinvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::NodeAdded)
//!     .with_node("talker")
//!     .with_reason("first association");
//!
//! assert_eq!(ev.kind, EventKind::NodeAdded);
//! assert_eq!(ev.node.as_deref(), Some("talker"));
//! assert_eq!(ev.reason.as_deref(), Some("first association"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::entities::EntityKey;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `node`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `node`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Structural events ===
    /// Node associated with the executor.
    ///
    /// Sets:
    /// - `node`: node name
    /// - `entities`: entities wired for the node
    NodeAdded,

    /// Node detached from the executor.
    ///
    /// Sets:
    /// - `node`: node name
    NodeRemoved,

    /// Collector rebuilt the dispatch table after a structural signal.
    ///
    /// Sets:
    /// - `entities`: live entities after the rebuild
    EntitiesRebuilt,

    // === Scheduling events ===
    /// A `spin*` entry point started.
    ///
    /// Sets:
    /// - `reason`: entry point name
    SpinStarted,

    /// A `spin*` entry point returned.
    ///
    /// Sets:
    /// - `reason`: entry point name
    /// - `entities`: events dispatched by this call
    SpinStopped,

    /// `cancel()` was called.
    CancelRequested,

    /// Ready signal for an unknown or destroyed entity was discarded.
    ///
    /// Sets:
    /// - `entity`: key carried by the signal
    StaleEventDropped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Node (or subscriber) name, if applicable.
    pub node: Option<Arc<str>>,
    /// Entity the event is about.
    pub entity: Option<EntityKey>,
    /// Entity or dispatch count, depending on the kind.
    pub entities: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            node: None,
            entity: None,
            entities: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a node name.
    #[inline]
    pub fn with_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attaches an entity key.
    #[inline]
    pub fn with_entity(mut self, key: EntityKey) -> Self {
        self.entity = Some(key);
        self
    }

    /// Attaches a count (saturating at `u32::MAX`).
    #[inline]
    pub fn with_entities(mut self, n: usize) -> Self {
        self.entities = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_node(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_node(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::SpinStarted);
        let b = Event::new(EventKind::SpinStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_helper_sets_fields() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.node.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
