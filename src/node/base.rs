//! # Node: entity factories and executor association.
//!
//! Every factory follows the same all-or-nothing sequence:
//!
//! ```text
//! 1. validate   group owned by this node?           ─► CrossOwnershipViolation
//!               QoS eligible (if intra-process)?   ─► InvalidConfiguration
//! 2. register   router (if intra-process), then callback group
//! 3. signal     notify guard condition             ─► SignalingFailure
//! ```
//!
//! Nothing is registered before step 1 passes, so a rejected call leaves the
//! node, its groups and the router untouched.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::entities::{
    CallbackGroup, CallbackGroupType, Client, Publisher, PublisherOptions, Service, Subscription,
    SubscriptionIntraProcess, Timer, Waitable,
};
use crate::error::ExecutorError;
use crate::intra_process::{IntraProcessPublisher, IntraProcessSubscriber};
use crate::policies::QoS;

use super::context::Context;
use super::guard::GuardCondition;
use super::{NodeId, NodeOptions, SubscriptionOptions};

/// Named owner of callback groups and entities.
pub struct Node {
    id: NodeId,
    name: String,
    options: NodeOptions,
    context: Arc<Context>,
    default_group: Arc<CallbackGroup>,
    groups: Mutex<Vec<Weak<CallbackGroup>>>,
    notify_guard: GuardCondition,
    has_executor: AtomicBool,
}

impl Node {
    pub(crate) fn new(context: Arc<Context>, name: String, options: NodeOptions) -> Arc<Self> {
        let id = NodeId::next();
        let default_group = CallbackGroup::new(CallbackGroupType::MutuallyExclusive, id);
        Arc::new(Self {
            id,
            name,
            options,
            context,
            groups: Mutex::new(vec![Arc::downgrade(&default_group)]),
            default_group,
            notify_guard: GuardCondition::new(),
            has_executor: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Group used when a factory is given none.
    pub fn default_callback_group(&self) -> Arc<CallbackGroup> {
        self.default_group.clone()
    }

    /// Creates a group owned by this node.
    ///
    /// The node keeps a weak reference; the group lives as long as the caller holds it.
    pub fn create_callback_group(&self, kind: CallbackGroupType) -> Arc<CallbackGroup> {
        let group = CallbackGroup::new(kind, self.id);
        let mut groups = self.groups();
        groups.retain(|g| g.strong_count() > 0);
        groups.push(Arc::downgrade(&group));
        group
    }

    /// True if `group` was created by this node and is still registered.
    pub fn callback_group_in_node(&self, group: &Arc<CallbackGroup>) -> bool {
        group.owner() == self.id
            && self
                .groups()
                .iter()
                .any(|g| std::ptr::eq(g.as_ptr(), Arc::as_ptr(group)))
    }

    /// Live callback groups, default group first.
    pub fn callback_groups(&self) -> Vec<Arc<CallbackGroup>> {
        self.groups().iter().filter_map(Weak::upgrade).collect()
    }

    /// Guard condition signaling structural changes to the executor.
    pub fn notify_guard_condition(&self) -> &GuardCondition {
        &self.notify_guard
    }

    /// Flag recording whether an executor currently owns this node.
    ///
    /// Only the executor's collector mutates it, through an atomic exchange.
    pub fn associated_with_executor(&self) -> &AtomicBool {
        &self.has_executor
    }

    /// Creates a publisher on `topic`.
    pub fn create_publisher<M>(
        &self,
        topic: &str,
        qos: QoS,
        options: PublisherOptions<M>,
    ) -> Result<Arc<Publisher<M>>, ExecutorError>
    where
        M: Clone + Send + Sync + 'static,
    {
        let intra = options
            .intra_process
            .resolve(self.options.use_intra_process_comms);
        if intra {
            qos.check_intra_process_publisher()?;
        }

        let publisher = Publisher::new(topic, qos, options.transport);
        if intra {
            let router = self.context.router();
            let weak: Weak<dyn IntraProcessPublisher> = Arc::downgrade(&publisher) as _;
            let id = router.register_publisher(weak, topic, &qos)?;
            publisher.setup_intra_process(id, router);
        }

        self.notify_guard.trigger()?;
        Ok(publisher)
    }

    /// Creates a subscription on `topic`.
    ///
    /// With intra-process delivery the subscription's adapter is added to the
    /// same group as a waitable.
    pub fn create_subscription<M, F>(
        &self,
        topic: &str,
        qos: QoS,
        callback: F,
        options: SubscriptionOptions,
    ) -> Result<Arc<Subscription<M>>, ExecutorError>
    where
        M: Send + Sync + 'static,
        F: Fn(M) + Send + Sync + 'static,
    {
        let group = self.resolve_group(options.callback_group)?;
        let intra = options
            .intra_process
            .resolve(self.options.use_intra_process_comms);
        if intra {
            qos.check_intra_process_subscription()?;
        }

        let subscription = Subscription::new(topic, qos, Arc::new(callback));
        if intra {
            let router = self.context.router();
            let adapter = SubscriptionIntraProcess::new(topic, &qos, subscription.callback());
            let weak: Weak<dyn IntraProcessSubscriber> = Arc::downgrade(&adapter) as _;
            let id = router.register_subscription(weak, topic, &qos)?;
            subscription.setup_intra_process(id, adapter.clone(), router);
            group.add_waitable(adapter);
        }
        group.add_subscription(subscription.clone());

        self.notify_guard.trigger()?;
        Ok(subscription)
    }

    /// Creates a periodic timer.
    pub fn create_timer<F>(
        &self,
        period: Duration,
        callback: F,
        group: Option<Arc<CallbackGroup>>,
    ) -> Result<Arc<Timer>, ExecutorError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let group = self.resolve_group(group)?;
        let timer = Timer::new(period, callback);
        group.add_timer(&timer);
        self.notify_guard.trigger()?;
        Ok(timer)
    }

    /// Creates a service registered under `name` in the context.
    pub fn create_service<Req, Res, F>(
        &self,
        name: &str,
        handler: F,
        group: Option<Arc<CallbackGroup>>,
    ) -> Result<Arc<Service<Req, Res>>, ExecutorError>
    where
        Req: Send + 'static,
        Res: Send + 'static,
        F: Fn(Req) -> Res + Send + Sync + 'static,
    {
        let group = self.resolve_group(group)?;
        let service = Service::new(name, handler, self.context.services());
        group.add_service(service.clone());
        self.notify_guard.trigger()?;
        Ok(service)
    }

    /// Creates a client calling the service registered under `name`.
    pub fn create_client<Req, Res>(
        &self,
        name: &str,
        group: Option<Arc<CallbackGroup>>,
    ) -> Result<Arc<Client<Req, Res>>, ExecutorError>
    where
        Req: Send + 'static,
        Res: Send + 'static,
    {
        let group = self.resolve_group(group)?;
        let client = Client::new(name, self.context.services().clone());
        group.add_client(client.clone());
        self.notify_guard.trigger()?;
        Ok(client)
    }

    /// Adds a caller-owned waitable.
    pub fn add_waitable(
        &self,
        waitable: Arc<dyn Waitable>,
        group: Option<Arc<CallbackGroup>>,
    ) -> Result<(), ExecutorError> {
        let group = self.resolve_group(group)?;
        group.add_waitable(waitable);
        self.notify_guard.trigger()
    }

    fn resolve_group(
        &self,
        group: Option<Arc<CallbackGroup>>,
    ) -> Result<Arc<CallbackGroup>, ExecutorError> {
        match group {
            None => Ok(self.default_group.clone()),
            Some(g) if self.callback_group_in_node(&g) => Ok(g),
            Some(_) => Err(ExecutorError::CrossOwnershipViolation {
                node: self.name.clone(),
            }),
        }
    }

    fn groups(&self) -> MutexGuard<'_, Vec<Weak<CallbackGroup>>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
