//! # Typed publishers.
//!
//! A [`Publisher`] hands each message to the intra-process router, to an
//! optional external [`Transport`], or to both.
//!
//! ```text
//! publish(msg)
//!   ├─ intra-process on, no remote readers ─► router.publish(id, msg, keep_copy=false)
//!   ├─ intra-process on, remote readers    ─► router.publish(id, msg, keep_copy=true)
//!   │                                          └─► transport.publish(topic, original)
//!   └─ intra-process off                   ─► transport.publish(topic, msg)
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::intra_process::{IntraProcessId, IntraProcessPublisher, IntraProcessRouter};
use crate::policies::{IntraProcessSetting, QoS};

/// External wire collaborator for inter-process delivery.
pub trait Transport<M>: Send + Sync + 'static {
    /// Sends `msg` on `topic` to remote readers.
    fn publish(&self, topic: &str, msg: M);

    /// Number of remote readers currently matched on `topic`.
    fn subscription_count(&self, topic: &str) -> usize;
}

/// Creation options of a publisher.
pub struct PublisherOptions<M> {
    /// Intra-process delivery setting; `NodeDefault` defers to the node.
    pub intra_process: IntraProcessSetting,
    /// Optional inter-process transport.
    pub transport: Option<Arc<dyn Transport<M>>>,
}

impl<M> Default for PublisherOptions<M> {
    fn default() -> Self {
        Self {
            intra_process: IntraProcessSetting::NodeDefault,
            transport: None,
        }
    }
}

impl<M> Clone for PublisherOptions<M> {
    fn clone(&self) -> Self {
        Self {
            intra_process: self.intra_process,
            transport: self.transport.clone(),
        }
    }
}

struct IntraProcessLink {
    id: IntraProcessId,
    router: Weak<IntraProcessRouter>,
}

/// Typed publisher.
pub struct Publisher<M> {
    topic: String,
    qos: QoS,
    transport: Option<Arc<dyn Transport<M>>>,
    intra: OnceLock<IntraProcessLink>,
}

impl<M> Publisher<M>
where
    M: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(topic: &str, qos: QoS, transport: Option<Arc<dyn Transport<M>>>) -> Arc<Self> {
        Arc::new(Self {
            topic: topic.to_string(),
            qos,
            transport,
            intra: OnceLock::new(),
        })
    }

    pub(crate) fn setup_intra_process(&self, id: IntraProcessId, router: &Arc<IntraProcessRouter>) {
        let _ = self.intra.set(IntraProcessLink {
            id,
            router: Arc::downgrade(router),
        });
    }

    /// Publishes `msg` to every local and remote reader of the topic.
    pub fn publish(&self, msg: M) {
        let remote = self
            .transport
            .as_ref()
            .is_some_and(|t| t.subscription_count(&self.topic) > 0);

        let router = self
            .intra
            .get()
            .and_then(|link| link.router.upgrade().map(|r| (link.id, r)));

        let leftover = match router {
            Some((id, router)) => router.publish(id, msg, remote),
            None => Some(msg),
        };

        if let (Some(msg), Some(transport)) = (leftover, self.transport.as_ref()) {
            transport.publish(&self.topic, msg);
        }
    }

    /// Topic this publisher writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// QoS profile the publisher was created with.
    pub fn qos(&self) -> &QoS {
        &self.qos
    }

    /// Intra-process id, if intra-process delivery is enabled.
    pub fn intra_process_id(&self) -> Option<IntraProcessId> {
        self.intra.get().map(|l| l.id)
    }

    /// Local plus remote readers currently matched.
    pub fn subscription_count(&self) -> usize {
        let local = self
            .intra
            .get()
            .and_then(|link| link.router.upgrade().map(|r| r.subscription_count::<M>(link.id)))
            .unwrap_or(0);
        let remote = self
            .transport
            .as_ref()
            .map_or(0, |t| t.subscription_count(&self.topic));
        local + remote
    }
}

impl<M> IntraProcessPublisher for Publisher<M>
where
    M: Send + Sync + 'static,
{
    fn topic_name(&self) -> &str {
        &self.topic
    }
}

impl<M> Drop for Publisher<M> {
    fn drop(&mut self) {
        if let Some(link) = self.intra.get() {
            if let Some(router) = link.router.upgrade() {
                router.remove_publisher(link.id);
            }
        }
    }
}

impl<M> fmt::Debug for Publisher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("intra_process", &self.intra.get().map(|l| l.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::entities::SubscriptionIntraProcess;
    use crate::intra_process::IntraProcessSubscriber;

    #[derive(Default)]
    struct Wire {
        remote_readers: usize,
        sent: Mutex<Vec<String>>,
    }

    impl Transport<String> for Wire {
        fn publish(&self, _topic: &str, msg: String) {
            self.sent.lock().unwrap().push(msg);
        }

        fn subscription_count(&self, _topic: &str) -> usize {
            self.remote_readers
        }
    }

    fn wired(
        router: &Arc<IntraProcessRouter>,
        wire: Arc<Wire>,
    ) -> (Arc<Publisher<String>>, Arc<SubscriptionIntraProcess<String>>) {
        let qos = QoS::keep_last(4);
        let publisher = Publisher::new("chatter", qos, Some(wire as Arc<dyn Transport<String>>));
        let weak: Weak<dyn IntraProcessPublisher> = Arc::downgrade(&publisher) as _;
        let id = router.register_publisher(weak, "chatter", &qos).unwrap();
        publisher.setup_intra_process(id, router);

        let adapter = SubscriptionIntraProcess::new("chatter", &qos, Arc::new(|_: String| {}));
        let weak: Weak<dyn IntraProcessSubscriber> = Arc::downgrade(&adapter) as _;
        router.register_subscription(weak, "chatter", &qos).unwrap();
        (publisher, adapter)
    }

    #[test]
    fn local_only_skips_transport() {
        let router = IntraProcessRouter::new();
        let wire = Arc::new(Wire::default());
        let (publisher, adapter) = wired(&router, wire.clone());

        publisher.publish("hi".into());
        assert_eq!(adapter.pending(), 1);
        assert!(wire.sent.lock().unwrap().is_empty());
        assert_eq!(publisher.subscription_count(), 1);
    }

    #[test]
    fn remote_readers_get_the_original() {
        let router = IntraProcessRouter::new();
        let wire = Arc::new(Wire {
            remote_readers: 2,
            ..Wire::default()
        });
        let (publisher, adapter) = wired(&router, wire.clone());

        publisher.publish("hi".into());
        assert_eq!(adapter.pending(), 1);
        assert_eq!(wire.sent.lock().unwrap().as_slice(), &["hi".to_string()]);
        assert_eq!(publisher.subscription_count(), 3);
    }

    #[test]
    fn drop_unregisters_from_router() {
        let router = IntraProcessRouter::new();
        let (publisher, _adapter) = wired(&router, Arc::new(Wire::default()));
        let id = publisher.intra_process_id().unwrap();
        drop(publisher);
        assert!(router.topic_of_publisher(id).is_none());
    }
}
