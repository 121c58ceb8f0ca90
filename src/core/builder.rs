use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::collector::EntitiesCollector;
use super::config::ExecutorConfig;
use super::executor::EventsExecutor;
use super::queue::EventsQueue;
use super::timers::TimersManager;
use crate::{
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`EventsExecutor`] with optional features.
pub struct ExecutorBuilder {
    cfg: ExecutorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ExecutorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ExecutorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive executor events (node association, spin lifecycle,
    /// stale signals) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the executor.
    ///
    /// Must be called inside a tokio runtime: it spawns the timers driver and,
    /// when subscribers are configured, the subscriber workers and listener.
    pub fn build(self) -> Arc<EventsExecutor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let runtime_token = CancellationToken::new();

        let queue = Arc::new(EventsQueue::new());
        let timers = Arc::new(TimersManager::new(queue.clone()));
        let collector = EntitiesCollector::new(queue.clone(), timers.clone());

        tokio::spawn(timers.clone().run(runtime_token.child_token()));

        let exec = Arc::new(EventsExecutor::new_internal(
            self.cfg,
            bus,
            subs,
            queue,
            timers,
            collector,
            runtime_token,
        ));
        exec.subscriber_listener();
        exec
    }
}
