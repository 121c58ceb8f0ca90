//! # Intra-process router: topic routes and ownership-safe delivery.
//!
//! The router indexes same-process publishers and subscriptions by topic and
//! hands messages over without touching the transport.
//!
//! ## Architecture
//! ```text
//! Publisher::publish(msg)
//!     └─► router.publish(pub_id, msg, keep_copy)
//!            ├─ publishers[pub_id].topic ─► topics[topic].subscriptions
//!            ├─ upgrade Weak + downcast to SubscriptionIntraProcess<M>
//!            └─ deliver:
//!                 1 target, !keep_copy ─► move msg
//!                 N targets           ─► clone to N-1, move into the last
//!                 keep_copy           ─► clone to all, return msg to caller
//! ```
//!
//! ## Rules
//! - Eligibility is checked at registration; a rejected endpoint leaves no trace.
//! - Lookups of destroyed endpoints resolve to `None`, never to an error.
//! - No two delivery targets ever share a message value.
//! - Delivery happens after the index lock is released.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, Weak};

use crate::entities::SubscriptionIntraProcess;
use crate::error::ExecutorError;
use crate::policies::QoS;

use super::ids::{IdRegistry, IntraProcessId};

/// Publisher side of an intra-process route.
pub trait IntraProcessPublisher: Send + Sync + 'static {
    /// Topic the publisher writes to.
    fn topic_name(&self) -> &str;
}

/// Subscription side of an intra-process route.
pub trait IntraProcessSubscriber: Send + Sync + 'static {
    /// Topic the subscription reads from.
    fn topic_name(&self) -> &str;

    /// Type-erased handle used to recover the concrete message type.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct Route<T: ?Sized> {
    topic: Arc<str>,
    endpoint: Weak<T>,
}

#[derive(Default)]
struct TopicIndex {
    publishers: BTreeSet<IntraProcessId>,
    subscriptions: BTreeSet<IntraProcessId>,
}

impl TopicIndex {
    fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.subscriptions.is_empty()
    }
}

#[derive(Default)]
struct RouterState {
    publishers: HashMap<IntraProcessId, Route<dyn IntraProcessPublisher>>,
    subscriptions: HashMap<IntraProcessId, Route<dyn IntraProcessSubscriber>>,
    topics: HashMap<Arc<str>, TopicIndex>,
}

/// Same-process message router.
pub struct IntraProcessRouter {
    ids: IdRegistry,
    state: RwLock<RouterState>,
}

impl IntraProcessRouter {
    /// Creates an empty router.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ids: IdRegistry::new(),
            state: RwLock::new(RouterState::default()),
        })
    }

    /// Registers a publisher under `topic`.
    ///
    /// Fails with [`ExecutorError::InvalidConfiguration`] before allocating an
    /// id when `qos` is not eligible.
    pub fn register_publisher(
        &self,
        endpoint: Weak<dyn IntraProcessPublisher>,
        topic: &str,
        qos: &QoS,
    ) -> Result<IntraProcessId, ExecutorError> {
        qos.check_intra_process_publisher()?;

        let id = self.ids.allocate();
        let mut state = self.write();
        let topic = Self::intern(&mut state, topic);
        state
            .topics
            .entry(topic.clone())
            .or_default()
            .publishers
            .insert(id);
        state.publishers.insert(id, Route { topic, endpoint });
        Ok(id)
    }

    /// Registers a subscription under `topic`.
    ///
    /// Same eligibility rules as publishers, plus `KeepLast` with depth 0 is rejected.
    pub fn register_subscription(
        &self,
        endpoint: Weak<dyn IntraProcessSubscriber>,
        topic: &str,
        qos: &QoS,
    ) -> Result<IntraProcessId, ExecutorError> {
        qos.check_intra_process_subscription()?;

        let id = self.ids.allocate();
        let mut state = self.write();
        let topic = Self::intern(&mut state, topic);
        state
            .topics
            .entry(topic.clone())
            .or_default()
            .subscriptions
            .insert(id);
        state.subscriptions.insert(id, Route { topic, endpoint });
        Ok(id)
    }

    /// Resolves a publisher id; `None` if unknown or destroyed.
    pub fn lookup_publisher(&self, id: IntraProcessId) -> Option<Arc<dyn IntraProcessPublisher>> {
        self.read()
            .publishers
            .get(&id)
            .and_then(|r| r.endpoint.upgrade())
    }

    /// Resolves a subscription id; `None` if unknown or destroyed.
    pub fn lookup_subscription(
        &self,
        id: IntraProcessId,
    ) -> Option<Arc<dyn IntraProcessSubscriber>> {
        self.read()
            .subscriptions
            .get(&id)
            .and_then(|r| r.endpoint.upgrade())
    }

    /// Topic a publisher id is routed on.
    pub fn topic_of_publisher(&self, id: IntraProcessId) -> Option<Arc<str>> {
        self.read().publishers.get(&id).map(|r| r.topic.clone())
    }

    /// Topic a subscription id is routed on.
    pub fn topic_of_subscription(&self, id: IntraProcessId) -> Option<Arc<str>> {
        self.read().subscriptions.get(&id).map(|r| r.topic.clone())
    }

    /// Number of live local subscriptions a publisher of `M` delivers to.
    ///
    /// Subscriptions on the topic with another message type are not counted,
    /// matching what [`publish`](Self::publish) skips.
    pub fn subscription_count<M>(&self, publisher: IntraProcessId) -> usize
    where
        M: Send + Sync + 'static,
    {
        let state = self.read();
        let Some(route) = state.publishers.get(&publisher) else {
            return 0;
        };
        let Some(index) = state.topics.get(&route.topic) else {
            return 0;
        };
        index
            .subscriptions
            .iter()
            .filter_map(|id| state.subscriptions.get(id))
            .filter_map(|r| r.endpoint.upgrade())
            .filter(|sub| {
                Arc::clone(sub)
                    .as_any_arc()
                    .is::<SubscriptionIntraProcess<M>>()
            })
            .count()
    }

    /// Unindexes a publisher. The id is not reused.
    pub fn remove_publisher(&self, id: IntraProcessId) {
        let mut state = self.write();
        if let Some(route) = state.publishers.remove(&id) {
            Self::unindex(&mut state, &route.topic, |idx| {
                idx.publishers.remove(&id);
            });
        }
    }

    /// Unindexes a subscription. The id is not reused.
    pub fn remove_subscription(&self, id: IntraProcessId) {
        let mut state = self.write();
        if let Some(route) = state.subscriptions.remove(&id) {
            Self::unindex(&mut state, &route.topic, |idx| {
                idx.subscriptions.remove(&id);
            });
        }
    }

    /// Delivers `msg` from publisher `from` to every matching local subscription.
    ///
    /// ### Ownership
    /// - Exactly one target and `keep_copy == false`: the message is moved.
    /// - Several targets: each receives its own value (clones, original moved last).
    /// - `keep_copy == true`: targets receive clones and the original is returned
    ///   for the inter-process path.
    ///
    /// Unknown publishers and unmatched topics are a no-op.
    pub fn publish<M>(&self, from: IntraProcessId, msg: M, keep_copy: bool) -> Option<M>
    where
        M: Clone + Send + Sync + 'static,
    {
        let targets = self.resolve_targets::<M>(from);

        if targets.is_empty() {
            return keep_copy.then_some(msg);
        }
        if keep_copy {
            for target in &targets {
                target.provide(msg.clone());
            }
            return Some(msg);
        }
        if let Some((last, rest)) = targets.split_last() {
            for target in rest {
                target.provide(msg.clone());
            }
            last.provide(msg);
        }
        None
    }

    fn resolve_targets<M>(&self, from: IntraProcessId) -> Vec<Arc<SubscriptionIntraProcess<M>>>
    where
        M: Clone + Send + Sync + 'static,
    {
        let state = self.read();
        let Some(route) = state.publishers.get(&from) else {
            return Vec::new();
        };
        let Some(index) = state.topics.get(&route.topic) else {
            return Vec::new();
        };

        index
            .subscriptions
            .iter()
            .filter_map(|id| state.subscriptions.get(id))
            .filter_map(|r| r.endpoint.upgrade())
            .filter_map(|sub| match sub.as_any_arc().downcast::<SubscriptionIntraProcess<M>>() {
                Ok(typed) => Some(typed),
                Err(_) => {
                    tracing::warn!(
                        topic = %route.topic,
                        "intra-process subscription with mismatched message type skipped"
                    );
                    None
                }
            })
            .collect()
    }

    fn intern(state: &mut RouterState, topic: &str) -> Arc<str> {
        state
            .topics
            .get_key_value(topic)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| Arc::from(topic))
    }

    fn unindex(state: &mut RouterState, topic: &Arc<str>, f: impl FnOnce(&mut TopicIndex)) {
        if let Some(index) = state.topics.get_mut(topic) {
            f(index);
            if index.is_empty() {
                state.topics.remove(topic);
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RouterState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RouterState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
