//! # Callback groups: mutual-exclusion scopes owning entities.
//!
//! A [`CallbackGroup`] belongs to exactly one node and holds weak references
//! to the entities created in it. The collector and the teardown path reach
//! entities only through the `find_*_ptrs_if` enumeration primitives.
//!
//! ```text
//! CallbackGroup
//!   ├─ kind: MutuallyExclusive ─► Semaphore(1) acquired around every execute
//!   │        Reentrant         ─► no serialization
//!   ├─ can_be_taken_from: AtomicBool (false while mutated / torn down)
//!   └─ entities (Weak): timers, subscriptions, services, clients, waitables
//! ```

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Semaphore;

use crate::node::NodeId;

use super::executable::{ClientBase, EntityRef, ServiceBase, SubscriptionBase, Waitable};
use super::timer::Timer;

/// Concurrency mode of a callback group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CallbackGroupType {
    /// Callbacks of the group never run concurrently with each other.
    #[default]
    MutuallyExclusive,
    /// Callbacks of the group may run in parallel.
    Reentrant,
}

#[derive(Default)]
struct GroupEntities {
    timers: Vec<Weak<Timer>>,
    subscriptions: Vec<Weak<dyn SubscriptionBase>>,
    services: Vec<Weak<dyn ServiceBase>>,
    clients: Vec<Weak<dyn ClientBase>>,
    waitables: Vec<Weak<dyn Waitable>>,
}

/// Scope that owns entities and decides whether their callbacks may overlap.
pub struct CallbackGroup {
    kind: CallbackGroupType,
    owner: NodeId,
    can_be_taken_from: AtomicBool,
    exclusive: Option<Arc<Semaphore>>,
    entities: Mutex<GroupEntities>,
}

/// Applies `pred` to the live entries of `list`, returning the first match.
fn find_live<T: ?Sized>(
    list: &[Weak<T>],
    mut pred: impl FnMut(&Arc<T>) -> bool,
) -> Option<Arc<T>> {
    list.iter()
        .filter_map(Weak::upgrade)
        .find(|entity| pred(entity))
}

impl CallbackGroup {
    pub(crate) fn new(kind: CallbackGroupType, owner: NodeId) -> Arc<Self> {
        let exclusive = match kind {
            CallbackGroupType::MutuallyExclusive => Some(Arc::new(Semaphore::new(1))),
            CallbackGroupType::Reentrant => None,
        };
        Arc::new(Self {
            kind,
            owner,
            can_be_taken_from: AtomicBool::new(true),
            exclusive,
            entities: Mutex::new(GroupEntities::default()),
        })
    }

    /// Concurrency mode.
    #[inline]
    pub fn kind(&self) -> CallbackGroupType {
        self.kind
    }

    /// Node this group belongs to.
    #[inline]
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// False while the group is being mutated or torn down.
    pub fn can_be_taken_from(&self) -> bool {
        self.can_be_taken_from.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn set_can_be_taken_from(&self, value: bool) {
        self.can_be_taken_from.store(value, AtomicOrdering::Release);
    }

    /// Permit source serializing callbacks of an exclusive group.
    pub(crate) fn exclusive_gate(&self) -> Option<Arc<Semaphore>> {
        self.exclusive.clone()
    }

    /// First live timer matching `pred`.
    pub fn find_timer_ptrs_if(&self, pred: impl FnMut(&Arc<Timer>) -> bool) -> Option<Arc<Timer>> {
        find_live(&self.lock().timers, pred)
    }

    /// First live subscription matching `pred`.
    pub fn find_subscription_ptrs_if(
        &self,
        pred: impl FnMut(&Arc<dyn SubscriptionBase>) -> bool,
    ) -> Option<Arc<dyn SubscriptionBase>> {
        find_live(&self.lock().subscriptions, pred)
    }

    /// First live service matching `pred`.
    pub fn find_service_ptrs_if(
        &self,
        pred: impl FnMut(&Arc<dyn ServiceBase>) -> bool,
    ) -> Option<Arc<dyn ServiceBase>> {
        find_live(&self.lock().services, pred)
    }

    /// First live client matching `pred`.
    pub fn find_client_ptrs_if(
        &self,
        pred: impl FnMut(&Arc<dyn ClientBase>) -> bool,
    ) -> Option<Arc<dyn ClientBase>> {
        find_live(&self.lock().clients, pred)
    }

    /// First live waitable matching `pred`.
    pub fn find_waitable_ptrs_if(
        &self,
        pred: impl FnMut(&Arc<dyn Waitable>) -> bool,
    ) -> Option<Arc<dyn Waitable>> {
        find_live(&self.lock().waitables, pred)
    }

    /// Every live entity of every kind.
    pub fn collect_entities(&self) -> Vec<EntityRef> {
        let mut out = Vec::new();
        self.find_timer_ptrs_if(|t| {
            out.push(EntityRef::Timer(t.clone()));
            false
        });
        self.find_subscription_ptrs_if(|s| {
            out.push(EntityRef::Subscription(s.clone()));
            false
        });
        self.find_service_ptrs_if(|s| {
            out.push(EntityRef::Service(s.clone()));
            false
        });
        self.find_client_ptrs_if(|c| {
            out.push(EntityRef::Client(c.clone()));
            false
        });
        self.find_waitable_ptrs_if(|w| {
            out.push(EntityRef::Waitable(w.clone()));
            false
        });
        out
    }

    pub(crate) fn add_timer(&self, timer: &Arc<Timer>) {
        self.mutate(|e| e.timers.push(Arc::downgrade(timer)));
    }

    pub(crate) fn add_subscription(&self, sub: Arc<dyn SubscriptionBase>) {
        self.mutate(|e| e.subscriptions.push(Arc::downgrade(&sub)));
    }

    pub(crate) fn add_service(&self, service: Arc<dyn ServiceBase>) {
        self.mutate(|e| e.services.push(Arc::downgrade(&service)));
    }

    pub(crate) fn add_client(&self, client: Arc<dyn ClientBase>) {
        self.mutate(|e| e.clients.push(Arc::downgrade(&client)));
    }

    pub(crate) fn add_waitable(&self, waitable: Arc<dyn Waitable>) {
        self.mutate(|e| e.waitables.push(Arc::downgrade(&waitable)));
    }

    /// Runs `f` with the gate closed and prunes destroyed entries.
    fn mutate(&self, f: impl FnOnce(&mut GroupEntities)) {
        self.set_can_be_taken_from(false);
        {
            let mut entities = self.lock();
            f(&mut entities);
            entities.timers.retain(|w| w.strong_count() > 0);
            entities.subscriptions.retain(|w| w.strong_count() > 0);
            entities.services.retain(|w| w.strong_count() > 0);
            entities.clients.retain(|w| w.strong_count() > 0);
            entities.waitables.retain(|w| w.strong_count() > 0);
        }
        self.set_can_be_taken_from(true);
    }

    fn lock(&self) -> MutexGuard<'_, GroupEntities> {
        self.entities.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for CallbackGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackGroup")
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("can_be_taken_from", &self.can_be_taken_from())
            .finish()
    }
}
