//! # Typed subscriptions.
//!
//! A [`Subscription`] receives messages from two paths:
//! - **transport**: [`Subscription::handle_message`], called by the middleware;
//! - **intra-process**: its [`SubscriptionIntraProcess`] adapter, fed by the
//!   [`IntraProcessRouter`](crate::IntraProcessRouter) and dispatched as a waitable.
//!
//! Both paths buffer the message, signal the executor through their wake slot
//! and hand exactly one message to the user callback per `execute`.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::intra_process::{IntraProcessId, IntraProcessRouter, IntraProcessSubscriber};
use crate::policies::QoS;

use super::buffer::MessageBuffer;
use super::executable::{Executable, SubscriptionBase, Waitable};
use super::wake::{EntityKey, EntityKind, WakeSlot};

/// Shared user callback of a subscription.
pub type MessageCallback<M> = Arc<dyn Fn(M) + Send + Sync>;

struct IntraProcessLink<M> {
    id: IntraProcessId,
    adapter: Arc<SubscriptionIntraProcess<M>>,
    router: Weak<IntraProcessRouter>,
}

/// Typed subscription.
pub struct Subscription<M> {
    key: EntityKey,
    topic: String,
    qos: QoS,
    callback: MessageCallback<M>,
    buffer: MessageBuffer<M>,
    slot: WakeSlot,
    intra: OnceLock<IntraProcessLink<M>>,
}

impl<M> Subscription<M>
where
    M: Send + Sync + 'static,
{
    pub(crate) fn new(topic: &str, qos: QoS, callback: MessageCallback<M>) -> Arc<Self> {
        Arc::new(Self {
            key: EntityKey::next(),
            topic: topic.to_string(),
            qos,
            buffer: MessageBuffer::new(qos.buffer_bound()),
            callback,
            slot: WakeSlot::new(),
            intra: OnceLock::new(),
        })
    }

    /// Delivers a message from the transport and signals the executor.
    pub fn handle_message(&self, msg: M) {
        self.buffer.push(msg);
        self.notify_ready();
    }

    /// QoS profile the subscription was created with.
    pub fn qos(&self) -> &QoS {
        &self.qos
    }

    /// Intra-process id, if intra-process delivery is enabled.
    pub fn intra_process_id(&self) -> Option<IntraProcessId> {
        self.intra.get().map(|l| l.id)
    }

    /// Intra-process adapter, if enabled.
    pub fn intra_process_adapter(&self) -> Option<Arc<SubscriptionIntraProcess<M>>> {
        self.intra.get().map(|l| l.adapter.clone())
    }

    pub(crate) fn callback(&self) -> MessageCallback<M> {
        self.callback.clone()
    }

    pub(crate) fn setup_intra_process(
        &self,
        id: IntraProcessId,
        adapter: Arc<SubscriptionIntraProcess<M>>,
        router: &Arc<IntraProcessRouter>,
    ) {
        let _ = self.intra.set(IntraProcessLink {
            id,
            adapter,
            router: Arc::downgrade(router),
        });
    }
}

impl<M> Executable for Subscription<M>
where
    M: Send + Sync + 'static,
{
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Subscription
    }

    fn wake_slot(&self) -> &WakeSlot {
        &self.slot
    }

    fn pending_work(&self) -> usize {
        self.buffer.len()
    }

    fn execute(&self) {
        if let Some(msg) = self.buffer.pop() {
            (self.callback)(msg);
        }
    }
}

impl<M> SubscriptionBase for Subscription<M>
where
    M: Send + Sync + 'static,
{
    fn topic_name(&self) -> &str {
        &self.topic
    }

    fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Some(link) = self.intra.get() {
            if let Some(router) = link.router.upgrade() {
                router.remove_subscription(link.id);
            }
        }
    }
}

impl<M> fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Intra-process side of a subscription, dispatched as a waitable.
pub struct SubscriptionIntraProcess<M> {
    key: EntityKey,
    topic: String,
    buffer: MessageBuffer<M>,
    callback: MessageCallback<M>,
    slot: WakeSlot,
}

impl<M> SubscriptionIntraProcess<M>
where
    M: Send + Sync + 'static,
{
    pub(crate) fn new(topic: &str, qos: &QoS, callback: MessageCallback<M>) -> Arc<Self> {
        Arc::new(Self {
            key: EntityKey::next(),
            topic: topic.to_string(),
            buffer: MessageBuffer::new(qos.buffer_bound()),
            callback,
            slot: WakeSlot::new(),
        })
    }

    /// Stores a routed message and signals the executor.
    pub(crate) fn provide(&self, msg: M) {
        self.buffer.push(msg);
        self.notify_ready();
    }

    /// Messages waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn execute_one(&self) -> bool {
        match self.buffer.pop() {
            Some(msg) => {
                (self.callback)(msg);
                true
            }
            None => false,
        }
    }
}

impl<M> Executable for SubscriptionIntraProcess<M>
where
    M: Send + Sync + 'static,
{
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Waitable
    }

    fn wake_slot(&self) -> &WakeSlot {
        &self.slot
    }

    fn pending_work(&self) -> usize {
        self.buffer.len()
    }

    fn execute(&self) {
        self.execute_one();
    }
}

impl<M> Waitable for SubscriptionIntraProcess<M> where M: Send + Sync + 'static {}

impl<M> IntraProcessSubscriber for SubscriptionIntraProcess<M>
where
    M: Send + Sync + 'static,
{
    fn topic_name(&self) -> &str {
        &self.topic
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use crate::entities::wake::ReadyEvent;

    #[test]
    fn handle_message_buffers_and_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = Subscription::<u32>::new(
            "t",
            QoS::keep_last(2),
            Arc::new(move |m| s.lock().unwrap().push(m)),
        );

        let wakes = Arc::new(AtomicUsize::new(0));
        let w = wakes.clone();
        let key = sub.key();
        sub.set_wake_callback(Arc::new(move |ev: ReadyEvent| {
            assert_eq!(ev, ReadyEvent::entity(EntityKind::Subscription, key));
            w.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        sub.handle_message(1);
        sub.handle_message(2);
        sub.handle_message(3);
        assert_eq!(wakes.load(AtomicOrdering::SeqCst), 3);
        // Depth 2: the oldest message was evicted.
        assert_eq!(sub.pending(), 2);

        sub.execute();
        sub.execute();
        sub.execute();
        assert_eq!(seen.lock().unwrap().as_slice(), &[2, 3]);
    }

    #[test]
    fn intra_process_adapter_is_a_waitable() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let adapter = SubscriptionIntraProcess::<String>::new(
            "t",
            &QoS::keep_last(4),
            Arc::new(move |_| {
                h.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        assert_eq!(adapter.kind(), EntityKind::Waitable);
        adapter.provide("a".into());
        adapter.execute();
        adapter.execute();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }
}
