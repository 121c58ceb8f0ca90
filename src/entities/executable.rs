//! # Entity capability interface and the closed set of entity kinds.
//!
//! Every dispatchable entity implements [`Executable`]: it has a stable
//! [`EntityKey`], a [`WakeSlot`] the collector wires, and an `execute` the
//! dispatch core calls once per ready signal.
//!
//! Kind-specific traits ([`SubscriptionBase`], [`ServiceBase`], [`ClientBase`],
//! [`Waitable`]) extend it; timers are the concrete [`Timer`]. The closed
//! sums [`EntityRef`] / [`WeakEntity`] keep the collector's rebuild loop
//! exhaustive.

use std::sync::{Arc, Weak};

use super::timer::Timer;
use super::wake::{EntityKey, EntityKind, ReadyEvent, WakeSlot};

/// Capability shared by every entity kind.
pub trait Executable: Send + Sync + 'static {
    /// Stable identity of this entity.
    fn key(&self) -> EntityKey;

    /// Kind reported in ready events.
    fn kind(&self) -> EntityKind;

    /// Slot holding the registered wake callback.
    fn wake_slot(&self) -> &WakeSlot;

    /// Handles one ready signal.
    ///
    /// Called from a dispatch worker, never concurrently for entities of the
    /// same mutually exclusive group.
    fn execute(&self);

    /// Work items buffered on the entity and not yet executed.
    ///
    /// Work that arrived while no callback was installed is signaled once
    /// per item when the first callback is installed.
    fn pending_work(&self) -> usize {
        0
    }

    /// Installs a wake callback, replaying buffered work on first install.
    fn set_wake_callback(&self, cb: super::wake::WakeCallback) {
        if self.wake_slot().set(cb) {
            return;
        }
        for _ in 0..self.pending_work() {
            self.notify_ready();
        }
    }

    /// Clears the wake callback; no invocation happens after this returns.
    fn clear_wake_callback(&self) {
        self.wake_slot().clear();
    }

    /// Signals the executor that this entity has work.
    fn notify_ready(&self) -> bool {
        self.wake_slot()
            .notify(ReadyEvent::entity(self.kind(), self.key()))
    }
}

/// Subscription-side capability.
pub trait SubscriptionBase: Executable {
    /// Topic this subscription listens on.
    fn topic_name(&self) -> &str;

    /// Messages buffered and not yet handed to the callback.
    fn pending(&self) -> usize;
}

/// Service-side capability.
pub trait ServiceBase: Executable {
    /// Name the service is registered under.
    fn service_name(&self) -> &str;
}

/// Client-side capability.
pub trait ClientBase: Executable {
    /// Name of the service this client calls.
    fn service_name(&self) -> &str;

    /// Requests sent whose response callback has not run yet.
    fn pending_requests(&self) -> usize;
}

/// Generic waitable: anything that can become ready and be executed.
///
/// ## Example
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use spinvisor::{EntityKey, EntityKind, Executable, Waitable, WakeSlot};
///
/// struct Counter { key: EntityKey, slot: WakeSlot, hits: AtomicUsize }
///
/// impl Executable for Counter {
///     fn key(&self) -> EntityKey { self.key }
///     fn kind(&self) -> EntityKind { EntityKind::Waitable }
///     fn wake_slot(&self) -> &WakeSlot { &self.slot }
///     fn execute(&self) { self.hits.fetch_add(1, Ordering::SeqCst); }
/// }
/// impl Waitable for Counter {}
/// ```
pub trait Waitable: Executable {}

/// Strong reference to an entity of any kind.
#[derive(Clone)]
pub enum EntityRef {
    Timer(Arc<Timer>),
    Subscription(Arc<dyn SubscriptionBase>),
    Service(Arc<dyn ServiceBase>),
    Client(Arc<dyn ClientBase>),
    Waitable(Arc<dyn Waitable>),
}

impl EntityRef {
    /// Capability view.
    pub fn as_executable(&self) -> &dyn Executable {
        match self {
            EntityRef::Timer(t) => t.as_ref(),
            EntityRef::Subscription(s) => s.as_ref(),
            EntityRef::Service(s) => s.as_ref(),
            EntityRef::Client(c) => c.as_ref(),
            EntityRef::Waitable(w) => w.as_ref(),
        }
    }

    pub fn key(&self) -> EntityKey {
        self.as_executable().key()
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Timer(_) => EntityKind::Timer,
            EntityRef::Subscription(_) => EntityKind::Subscription,
            EntityRef::Service(_) => EntityKind::Service,
            EntityRef::Client(_) => EntityKind::Client,
            EntityRef::Waitable(_) => EntityKind::Waitable,
        }
    }

    /// Downgrades to a weak handle.
    pub fn downgrade(&self) -> WeakEntity {
        match self {
            EntityRef::Timer(t) => WeakEntity::Timer(Arc::downgrade(t)),
            EntityRef::Subscription(s) => WeakEntity::Subscription(Arc::downgrade(s)),
            EntityRef::Service(s) => WeakEntity::Service(Arc::downgrade(s)),
            EntityRef::Client(c) => WeakEntity::Client(Arc::downgrade(c)),
            EntityRef::Waitable(w) => WeakEntity::Waitable(Arc::downgrade(w)),
        }
    }
}

/// Weak reference to an entity of any kind.
#[derive(Clone)]
pub enum WeakEntity {
    Timer(Weak<Timer>),
    Subscription(Weak<dyn SubscriptionBase>),
    Service(Weak<dyn ServiceBase>),
    Client(Weak<dyn ClientBase>),
    Waitable(Weak<dyn Waitable>),
}

impl WeakEntity {
    /// Resolves to a strong reference if the entity is still alive.
    pub fn upgrade(&self) -> Option<EntityRef> {
        match self {
            WeakEntity::Timer(t) => t.upgrade().map(EntityRef::Timer),
            WeakEntity::Subscription(s) => s.upgrade().map(EntityRef::Subscription),
            WeakEntity::Service(s) => s.upgrade().map(EntityRef::Service),
            WeakEntity::Client(c) => c.upgrade().map(EntityRef::Client),
            WeakEntity::Waitable(w) => w.upgrade().map(EntityRef::Waitable),
        }
    }
}
