//! # Wake-up plumbing between entities and the executor.
//!
//! Every entity owns a [`WakeSlot`]. The executor (via the collector) installs
//! a [`WakeCallback`] in it; the entity calls [`WakeSlot::notify`] whenever it
//! has work. The callback only enqueues a [`ReadyEvent`] and never blocks.
//!
//! ## Rules
//! - At most one callback is installed per slot; `set` replaces the previous one.
//! - `notify` invokes the callback **while holding the slot lock**, so once
//!   `clear` returns no invocation is in flight and none can start.
//! - A notify on an empty slot is a no-op (nobody is listening).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

/// Global sequence counter for entity identities.
static ENTITY_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an entity or guard condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(u64);

impl EntityKey {
    /// Allocates the next key.
    pub(crate) fn next() -> Self {
        Self(ENTITY_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Classification of dispatchable entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Timer,
    Subscription,
    Service,
    Client,
    Waitable,
}

impl EntityKind {
    /// Short lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Timer => "timer",
            EntityKind::Subscription => "subscription",
            EntityKind::Service => "service",
            EntityKind::Client => "client",
            EntityKind::Waitable => "waitable",
        }
    }
}

/// Where a ready signal came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// An entity has work.
    Entity(EntityKind),
    /// A node's notify guard condition fired (entity set changed).
    Structural,
}

/// "You have work" signal placed on the executor queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReadyEvent {
    pub source: EventSource,
    pub key: EntityKey,
}

impl ReadyEvent {
    /// Creates an event for an entity of the given kind.
    #[inline]
    pub fn entity(kind: EntityKind, key: EntityKey) -> Self {
        Self {
            source: EventSource::Entity(kind),
            key,
        }
    }

    /// Creates a structural (guard-condition) event.
    #[inline]
    pub fn structural(key: EntityKey) -> Self {
        Self {
            source: EventSource::Structural,
            key,
        }
    }

    #[inline]
    pub fn is_structural(&self) -> bool {
        matches!(self.source, EventSource::Structural)
    }
}

/// Callback invoked when an entity becomes ready.
pub type WakeCallback = Arc<dyn Fn(ReadyEvent) + Send + Sync>;

/// Holder of an entity's registered wake callback.
#[derive(Default)]
pub struct WakeSlot {
    callback: Mutex<Option<WakeCallback>>,
}

impl WakeSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `cb`, replacing any previous callback.
    ///
    /// Returns true if a callback was already installed.
    pub fn set(&self, cb: WakeCallback) -> bool {
        self.lock().replace(cb).is_some()
    }

    /// Removes the callback; returns whether one was installed.
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }

    /// True if a callback is installed.
    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Invokes the callback with `ev`; returns whether anyone was notified.
    pub fn notify(&self, ev: ReadyEvent) -> bool {
        let guard = self.lock();
        match guard.as_ref() {
            Some(cb) => {
                cb(ev);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<WakeCallback>> {
        // A panicking callback must not disable wake-ups for good.
        self.callback.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for WakeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn keys_are_unique_and_increasing() {
        let a = EntityKey::next();
        let b = EntityKey::next();
        assert!(b > a);
    }

    #[test]
    fn notify_after_clear_is_silent() {
        let slot = WakeSlot::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        slot.set(Arc::new(move |_| {
            h.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        let ev = ReadyEvent::entity(EntityKind::Waitable, EntityKey::next());
        assert!(slot.notify(ev));
        assert!(slot.clear());
        assert!(!slot.notify(ev));
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn set_replaces_previous_callback() {
        let slot = WakeSlot::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = first.clone();
        let s = second.clone();
        assert!(!slot.set(Arc::new(move |_| {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        })));
        assert!(slot.set(Arc::new(move |_| {
            s.fetch_add(1, AtomicOrdering::SeqCst);
        })));

        slot.notify(ReadyEvent::structural(EntityKey::next()));
        assert_eq!(first.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(second.load(AtomicOrdering::SeqCst), 1);
    }
}
