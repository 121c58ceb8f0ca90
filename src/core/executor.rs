//! # EventsExecutor: event-driven dispatch with four scheduling policies.
//!
//! The [`EventsExecutor`] owns the ready-event queue, the entity collector,
//! the timers manager and the event bus. Entities never get polled: each one
//! pushes a [`ReadyEvent`] through its wake callback, and a scheduling entry
//! point drains the queue.
//!
//! ## Architecture
//! ```text
//! wake callbacks (any thread) ──push──► EventsQueue ◄──push── TimersManager driver
//!                                            │
//!          ┌──────────────┬──────────────────┼──────────────┬────────────────────┐
//!          ▼              ▼                  ▼              ▼                    ▼
//!       spin()      spin_some(max)     spin_all(max)   spin_once(max)   spin_until_complete
//!    N workers,     snapshot only,     drain incl.     wait ≤ max,      until future ready,
//!    until cancel   never waits        new events      one event        timeout or cancel
//!          └──────────────┴──────────────────┼──────────────┴────────────────────┘
//!                                            ▼
//!                                   dispatch(ReadyEvent)
//!                                     ├─ Structural ─► collector.execute() (rebuild)
//!                                     ├─ unknown/dead ─► StaleEventDropped
//!                                     └─ live entity ─► exclusive permit ─► execute()
//! ```
//!
//! ## Rules
//! - Only one `spin*` call runs at a time; a concurrent one fails with
//!   [`ExecutorError::AlreadySpinning`].
//! - `cancel()` wakes a blocked wait immediately: every wait is raced against
//!   the spin's cancellation token with `tokio::select!`.
//! - Events are dispatched in arrival order by a single worker; with several
//!   `spin()` workers only exclusive groups keep their callbacks serialized.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use spinvisor::{Context, EventsExecutor, ExecutorConfig, NodeOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exec = EventsExecutor::new(ExecutorConfig::default());
//!     let node = Context::new().create_node("ticker", NodeOptions::default());
//!
//!     let ticks = Arc::new(AtomicUsize::new(0));
//!     let t = ticks.clone();
//!     let _timer = node.create_timer(Duration::from_millis(5), move || {
//!         t.fetch_add(1, Ordering::SeqCst);
//!     }, None)?;
//!
//!     exec.add_node(&node)?;
//!     exec.spin_all(Duration::from_millis(50)).await?;
//!     exec.spin_once(Duration::from_secs(1)).await?;
//!     assert!(ticks.load(Ordering::SeqCst) >= 1);
//!     Ok(())
//! }
//! ```

use std::future::{self, Future};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::entities::{EntityRef, ReadyEvent};
use crate::error::ExecutorError;
use crate::events::{Bus, Event, EventKind};
use crate::node::Node;
use crate::subscribers::SubscriberSet;

use super::builder::ExecutorBuilder;
use super::collector::{EntitiesCollector, Resolved};
use super::config::ExecutorConfig;
use super::queue::EventsQueue;
use super::timers::TimersManager;

/// Outcome of [`EventsExecutor::spin_until_complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureReturnCode<T> {
    /// The future resolved with this value.
    Success(T),
    /// The timeout elapsed first.
    Timeout,
    /// `cancel()` was called first.
    Interrupted,
}

/// Marks a spin in progress; reports `SpinStopped` and clears the flag on drop.
struct SpinGuard<'a> {
    exec: &'a EventsExecutor,
    entry: &'static str,
    dispatched: usize,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.exec.bus.publish(
            Event::new(EventKind::SpinStopped)
                .with_reason(self.entry)
                .with_entities(self.dispatched),
        );
        self.exec
            .spinning
            .store(false, AtomicOrdering::Release);
    }
}

/// Event-driven executor.
pub struct EventsExecutor {
    cfg: ExecutorConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    queue: Arc<EventsQueue>,
    timers: Arc<TimersManager>,
    collector: EntitiesCollector,
    spinning: AtomicBool,
    cancel: Mutex<CancellationToken>,
    runtime_token: CancellationToken,
}

impl EventsExecutor {
    /// Builds an executor without subscribers. Must be called inside a tokio runtime.
    pub fn new(cfg: ExecutorConfig) -> Arc<Self> {
        ExecutorBuilder::new(cfg).build()
    }

    /// Returns a builder for attaching subscribers.
    pub fn builder(cfg: ExecutorConfig) -> ExecutorBuilder {
        ExecutorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: ExecutorConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        queue: Arc<EventsQueue>,
        timers: Arc<TimersManager>,
        collector: EntitiesCollector,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs,
            queue,
            timers,
            collector,
            spinning: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            runtime_token,
        }
    }

    /// Configuration the executor was built with.
    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    /// Event bus; subscribe to observe executor events directly.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Ready events currently queued.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// True while a `spin*` call is running.
    pub fn is_spinning(&self) -> bool {
        self.spinning.load(AtomicOrdering::Acquire)
    }

    /// Associates `node` with this executor and wires its entities.
    pub fn add_node(&self, node: &Arc<Node>) -> Result<(), ExecutorError> {
        let wired = self.collector.add_node(node)?;
        self.bus.publish(
            Event::new(EventKind::NodeAdded)
                .with_node(node.name())
                .with_entities(wired),
        );
        Ok(())
    }

    /// Detaches `node`; a node not associated here is ignored.
    pub fn remove_node(&self, node: &Arc<Node>) {
        if self.collector.remove_node(node) {
            self.bus
                .publish(Event::new(EventKind::NodeRemoved).with_node(node.name()));
        }
    }

    /// Requests the running `spin*` call to return.
    pub fn cancel(&self) {
        self.cancel_token().cancel();
        self.bus.publish(Event::new(EventKind::CancelRequested));
    }

    /// Dispatches events as they arrive until [`cancel`](Self::cancel).
    ///
    /// Runs [`ExecutorConfig::worker_count`] worker loops over the shared queue.
    pub async fn spin(self: &Arc<Self>) -> Result<(), ExecutorError> {
        let (mut guard, token) = self.begin_spin("spin")?;

        let mut set = JoinSet::new();
        for _ in 0..self.cfg.worker_count() {
            let this = Arc::clone(self);
            let token = token.clone();
            set.spawn(async move { this.worker_loop(&token).await });
        }
        while let Some(res) = set.join_next().await {
            match res {
                Ok(n) => guard.dispatched += n,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => {}
            }
        }
        Ok(())
    }

    /// Dispatches the events already queued when called, without waiting for more.
    ///
    /// Due timers are queued first. Stops early once `max_duration` has elapsed
    /// (`Duration::ZERO` means no limit) or on cancel; the unprocessed rest
    /// stays queued in order. Returns the number of events dispatched.
    pub async fn spin_some(&self, max_duration: Duration) -> Result<usize, ExecutorError> {
        let (mut guard, token) = self.begin_spin("spin_some")?;
        let start = Instant::now();

        self.timers.push_ready(start);
        let mut snapshot = self.queue.take_all();
        while let Some(ev) = snapshot.pop_front() {
            let out_of_time = !max_duration.is_zero() && start.elapsed() >= max_duration;
            if out_of_time || token.is_cancelled() {
                snapshot.push_front(ev);
                break;
            }
            if self.dispatch(ev).await {
                guard.dispatched += 1;
            }
        }
        self.queue.requeue_front(snapshot);
        Ok(guard.dispatched)
    }

    /// Dispatches until the queue is empty or `max_duration` elapses.
    ///
    /// Events produced while running are drained too. Fails with
    /// [`ExecutorError::InvalidArgument`] if `max_duration` is zero.
    pub async fn spin_all(&self, max_duration: Duration) -> Result<usize, ExecutorError> {
        if max_duration.is_zero() {
            return Err(ExecutorError::InvalidArgument {
                reason: "spin_all max_duration must be positive".into(),
            });
        }
        let (mut guard, token) = self.begin_spin("spin_all")?;
        let deadline = Instant::now() + max_duration;

        while !token.is_cancelled() && Instant::now() < deadline {
            self.timers.push_ready(Instant::now());
            let Some(ev) = self.queue.pop() else {
                break;
            };
            if self.dispatch(ev).await {
                guard.dispatched += 1;
            }
        }
        Ok(guard.dispatched)
    }

    /// Waits up to `max_duration` for one entity event and dispatches it.
    ///
    /// Structural rebuilds met on the way are applied without ending the call.
    /// Returns `Ok(0)` if nothing arrived in time or the wait was cancelled.
    pub async fn spin_once(&self, max_duration: Duration) -> Result<usize, ExecutorError> {
        let (mut guard, token) = self.begin_spin("spin_once")?;
        let deadline = Instant::now() + max_duration;

        // Rebuilds and stale signals do not count as the one event.
        while !token.is_cancelled() {
            self.timers.push_ready(Instant::now());
            let ev = match self.queue.pop() {
                Some(ev) => ev,
                None => tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    ev = self.queue.wait_pop() => ev,
                    _ = tokio::time::sleep_until(deadline) => break,
                },
            };
            let structural = ev.is_structural();
            if self.dispatch(ev).await && !structural {
                guard.dispatched = 1;
                break;
            }
        }
        Ok(guard.dispatched)
    }

    /// Dispatches until `future` resolves, `timeout` elapses or `cancel()` is called.
    ///
    /// `timeout = None` waits indefinitely.
    pub async fn spin_until_complete<F>(
        &self,
        future: F,
        timeout: Option<Duration>,
    ) -> Result<FutureReturnCode<F::Output>, ExecutorError>
    where
        F: Future,
    {
        let (mut guard, token) = self.begin_spin("spin_until_complete")?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::pin!(future);
        tokio::pin!(expired);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(FutureReturnCode::Interrupted),
                out = &mut future => return Ok(FutureReturnCode::Success(out)),
                _ = &mut expired => return Ok(FutureReturnCode::Timeout),
                ev = self.queue.wait_pop() => {
                    if self.dispatch(ev).await {
                        guard.dispatched += 1;
                    }
                }
            }
        }
    }

    async fn worker_loop(&self, token: &CancellationToken) -> usize {
        let mut dispatched = 0;
        loop {
            let ev = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                ev = self.queue.wait_pop() => ev,
            };
            if self.dispatch(ev).await {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Handles one ready event; returns false if it was discarded.
    async fn dispatch(&self, ev: ReadyEvent) -> bool {
        if ev.is_structural() {
            let live = self.collector.execute();
            self.bus
                .publish(Event::new(EventKind::EntitiesRebuilt).with_entities(live));
            return true;
        }

        let Some(Resolved { entity, group }) = self.collector.resolve(ev.key) else {
            tracing::trace!(entity = %ev.key, "ready event for unknown entity dropped");
            self.bus
                .publish(Event::new(EventKind::StaleEventDropped).with_entity(ev.key));
            return false;
        };

        let _permit = match group.exclusive_gate() {
            Some(gate) => gate.acquire_owned().await.ok(),
            None => None,
        };
        if let EntityRef::Timer(timer) = &entity {
            if !timer.take_pending() {
                return false;
            }
        }
        entity.as_executable().execute();
        true
    }

    fn begin_spin(
        &self,
        entry: &'static str,
    ) -> Result<(SpinGuard<'_>, CancellationToken), ExecutorError> {
        if self.spinning.swap(true, AtomicOrdering::AcqRel) {
            return Err(ExecutorError::AlreadySpinning);
        }
        let token = {
            let mut current = self.cancel_token();
            *current = CancellationToken::new();
            current.clone()
        };
        self.bus
            .publish(Event::new(EventKind::SpinStarted).with_reason(entry));
        Ok((
            SpinGuard {
                exec: self,
                entry,
                dispatched: 0,
            },
            token,
        ))
    }

    /// Forwards bus events to the subscriber set until the executor is dropped.
    pub(crate) fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            loop {
                let res = tokio::select! {
                    _ = token.cancelled() => break,
                    res = rx.recv() => res,
                };
                match res {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn cancel_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for EventsExecutor {
    fn drop(&mut self) {
        self.cancel_token().cancel();
        self.runtime_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::entities::{
        CallbackGroupType, EntityKey, EntityKind, Executable, PublisherOptions, Waitable, WakeSlot,
    };
    use crate::node::{Context, NodeOptions, SubscriptionOptions};
    use crate::policies::QoS;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn node(intra: bool) -> Arc<Node> {
        Context::new().create_node(
            "test_node",
            NodeOptions {
                use_intra_process_comms: intra,
            },
        )
    }

    /// Adds `node` and drains whatever its wiring queued.
    async fn attach(exec: &Arc<EventsExecutor>, node: &Arc<Node>) {
        exec.add_node(node).unwrap();
        exec.spin_some(Duration::ZERO).await.unwrap();
    }

    /// Waitable that re-signals itself until it has run `limit` times.
    struct Echo {
        key: EntityKey,
        slot: WakeSlot,
        runs: AtomicUsize,
        limit: usize,
    }

    impl Executable for Echo {
        fn key(&self) -> EntityKey {
            self.key
        }
        fn kind(&self) -> EntityKind {
            EntityKind::Waitable
        }
        fn wake_slot(&self) -> &WakeSlot {
            &self.slot
        }
        fn execute(&self) {
            let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if runs < self.limit {
                self.notify_ready();
            }
        }
    }

    impl Waitable for Echo {}

    fn echo(limit: usize) -> Arc<Echo> {
        Arc::new(Echo {
            key: EntityKey::next(),
            slot: WakeSlot::new(),
            runs: AtomicUsize::new(0),
            limit,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn spin_once_times_out_without_work() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let (hits, cb) = counter();
        let _timer = n.create_timer(Duration::from_secs(10), cb, None).unwrap();
        attach(&exec, &n).await;

        let start = Instant::now();
        assert_eq!(exec.spin_once(Duration::from_millis(100)).await.unwrap(), 0);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(10));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spin_once_dispatches_due_timer() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let (hits, cb) = counter();
        let _timer = n
            .create_timer(Duration::from_millis(10), cb, None)
            .unwrap();
        exec.add_node(&n).unwrap();

        let start = Instant::now();
        assert_eq!(exec.spin_once(Duration::from_secs(10)).await.unwrap(), 1);
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spin_some_skips_timers_not_yet_due() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let (hits, cb) = counter();
        let _timer = n
            .create_timer(Duration::from_millis(10), cb, None)
            .unwrap();
        exec.add_node(&n).unwrap();

        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(10)).await;
        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spin_all_runs_due_timer_right_after_add_node() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let (hits, cb) = counter();
        let _timer = n
            .create_timer(Duration::from_millis(10), cb, None)
            .unwrap();
        exec.add_node(&n).unwrap();

        tokio::time::advance(Duration::from_millis(10)).await;
        exec.spin_all(Duration::from_secs(1)).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spin_once_skips_rebuild_and_waits_for_entity_event() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        exec.add_node(&n).unwrap();

        // Created after add_node: a structural event is queued first.
        let (hits, cb) = counter();
        let _timer = n
            .create_timer(Duration::from_millis(10), cb, None)
            .unwrap();
        assert_eq!(exec.pending_events(), 1);

        assert_eq!(exec.spin_once(Duration::from_secs(10)).await.unwrap(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn message_delivered_before_add_node_is_dispatched() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = n
            .create_subscription(
                "early",
                QoS::default(),
                move |v: u8| {
                    assert_eq!(v, 7);
                    h.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        sub.handle_message(7);

        exec.add_node(&n).unwrap();
        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sub.pending_work(), 0);
    }

    #[tokio::test]
    async fn intra_process_publish_before_rebuild_is_dispatched() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(true);
        attach(&exec, &n).await;

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = n
            .create_subscription(
                "chatter",
                QoS::keep_last(10),
                move |_: u32| {
                    h.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        let publisher = n
            .create_publisher::<u32>("chatter", QoS::keep_last(10), PublisherOptions::default())
            .unwrap();
        publisher.publish(1);

        exec.spin_all(Duration::from_secs(1)).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spin_picks_up_entities_created_while_running() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        exec.add_node(&n).unwrap();

        let spinner = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.spin().await })
        };
        while !exec.is_spinning() {
            tokio::task::yield_now().await;
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = n
            .create_subscription(
                "late",
                QoS::default(),
                move |_: u8| {
                    h.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        // No yield in between: the message lands before the rebuild runs.
        sub.handle_message(1);

        tokio::time::timeout(Duration::from_secs(1), async {
            while hits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("callback did not run while spinning");

        sub.handle_message(2);
        tokio::time::timeout(Duration::from_secs(1), async {
            while hits.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("second message not dispatched");

        exec.cancel();
        spinner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn spin_some_respects_max_duration() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = n
            .create_subscription(
                "slow",
                QoS::keep_last(10),
                move |_: u32| {
                    std::thread::sleep(Duration::from_millis(20));
                    h.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        attach(&exec, &n).await;

        for i in 0..5 {
            sub.handle_message(i);
        }
        exec.spin_some(Duration::from_millis(50)).await.unwrap();
        let done = hits.load(Ordering::SeqCst);
        assert!((1..5).contains(&done));
        assert_eq!(exec.pending_events(), 5 - done);

        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn spin_all_drains_new_work_but_spin_some_does_not() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let first = echo(3);
        let second = echo(3);
        n.add_waitable(first.clone(), None).unwrap();
        n.add_waitable(second.clone(), None).unwrap();
        attach(&exec, &n).await;

        first.notify_ready();
        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(first.runs.load(Ordering::SeqCst), 1);
        exec.queue.take_all();

        second.notify_ready();
        exec.spin_all(Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn spin_all_rejects_zero_duration() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let err = exec.spin_all(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidArgument { .. }));
        assert!(!exec.is_spinning());
    }

    #[tokio::test]
    async fn cancel_wakes_blocked_spin() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        attach(&exec, &n).await;

        let spinner = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.spin().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(exec.is_spinning());

        exec.cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), spinner)
            .await
            .expect("spin did not return after cancel")
            .unwrap();
        assert!(res.is_ok());
        assert!(!exec.is_spinning());
    }

    #[tokio::test]
    async fn cancel_while_dispatching() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let (hits, cb) = counter();
        let _timer = n.create_timer(Duration::from_millis(1), cb, None).unwrap();
        attach(&exec, &n).await;

        let spinner = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.spin().await })
        };
        while hits.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        exec.cancel();
        tokio::time::timeout(Duration::from_secs(1), spinner)
            .await
            .expect("spin did not return after cancel")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_spin_is_rejected() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let spinner = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.spin().await })
        };
        while !exec.is_spinning() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            exec.spin_some(Duration::ZERO).await,
            Err(ExecutorError::AlreadySpinning)
        );
        exec.cancel();
        spinner.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_spin_once_wait() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let spinner = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.spin_once(Duration::from_secs(3600)).await })
        };
        while !exec.is_spinning() {
            tokio::task::yield_now().await;
        }
        let start = Instant::now();
        exec.cancel();
        assert_eq!(spinner.await.unwrap(), Ok(0));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn add_node_twice_then_readd_after_remove() {
        let exec1 = EventsExecutor::new(ExecutorConfig::default());
        let exec2 = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);

        exec1.add_node(&n).unwrap();
        assert!(matches!(
            exec1.add_node(&n),
            Err(ExecutorError::AlreadyAssociated { .. })
        ));
        assert!(matches!(
            exec2.add_node(&n),
            Err(ExecutorError::AlreadyAssociated { .. })
        ));

        exec1.remove_node(&n);
        exec1.remove_node(&n);
        exec2.add_node(&n).unwrap();
    }

    #[tokio::test]
    async fn no_callback_after_remove_node() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = n
            .create_subscription(
                "t",
                QoS::default(),
                move |_: u8| {
                    h.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        attach(&exec, &n).await;

        sub.handle_message(1);
        exec.remove_node(&n);
        sub.handle_message(2);
        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!sub.wake_slot().is_set());
    }

    #[tokio::test]
    async fn destroyed_subscription_is_excluded_from_dispatch() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(true);
        let mut rx = exec.bus().subscribe();

        let s1_hits = Arc::new(AtomicUsize::new(0));
        let s2_seen = Arc::new(StdMutex::new(Vec::new()));
        let h1 = s1_hits.clone();
        let seen = s2_seen.clone();
        let s1 = n
            .create_subscription(
                "chatter",
                QoS::keep_last(10),
                move |mut msg: Vec<u8>| {
                    msg.push(0xFF);
                    h1.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        let _s2 = n
            .create_subscription(
                "chatter",
                QoS::keep_last(10),
                move |msg: Vec<u8>| seen.lock().unwrap().push(msg),
                SubscriptionOptions::default(),
            )
            .unwrap();
        let publisher = n
            .create_publisher::<Vec<u8>>("chatter", QoS::keep_last(10), PublisherOptions::default())
            .unwrap();
        attach(&exec, &n).await;

        publisher.publish(vec![1, 2, 3]);
        drop(s1);
        exec.spin_some(Duration::ZERO).await.unwrap();

        assert_eq!(s1_hits.load(Ordering::SeqCst), 0);
        assert_eq!(s2_seen.lock().unwrap().as_slice(), &[vec![1u8, 2, 3]]);

        let mut stale = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::StaleEventDropped {
                stale += 1;
            }
        }
        assert_eq!(stale, 1);
    }

    #[tokio::test]
    async fn client_receives_service_response() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        let _service = n
            .create_service("add_two_ints", |(a, b): (i64, i64)| a + b, None)
            .unwrap();
        let client = n.create_client::<(i64, i64), i64>("add_two_ints", None).unwrap();
        attach(&exec, &n).await;
        assert!(client.service_is_ready());

        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .async_send_request((40, 2), move |sum| {
                let _ = tx.send(sum);
            })
            .unwrap();

        let out = exec
            .spin_until_complete(rx, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(out, FutureReturnCode::Success(Ok(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn spin_until_complete_times_out() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let out = exec
            .spin_until_complete(future::pending::<()>(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(out, FutureReturnCode::Timeout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exclusive_group_never_overlaps() {
        let exec = EventsExecutor::new(ExecutorConfig {
            workers: 4,
            ..ExecutorConfig::default()
        });
        let n = node(false);
        let group = n.create_callback_group(CallbackGroupType::MutuallyExclusive);

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let make_cb = || {
            let (active, peak, done) = (active.clone(), peak.clone(), done.clone());
            move |_: u32| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(2));
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }
        };
        let opts = SubscriptionOptions::default().with_callback_group(group.clone());
        let a = n
            .create_subscription("a", QoS::keep_last(10), make_cb(), opts.clone())
            .unwrap();
        let b = n
            .create_subscription("b", QoS::keep_last(10), make_cb(), opts)
            .unwrap();
        attach(&exec, &n).await;

        let spinner = {
            let exec = exec.clone();
            tokio::spawn(async move { exec.spin().await })
        };
        for i in 0..10 {
            a.handle_message(i);
            b.handle_message(i);
        }
        while done.load(Ordering::SeqCst) < 20 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        exec.cancel();
        spinner.await.unwrap().unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn structural_signal_rebuilds_entities() {
        let exec = EventsExecutor::new(ExecutorConfig::default());
        let n = node(false);
        attach(&exec, &n).await;
        let mut rx = exec.bus().subscribe();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = n
            .create_subscription(
                "late",
                QoS::default(),
                move |_: u8| {
                    h.fetch_add(1, Ordering::SeqCst);
                },
                SubscriptionOptions::default(),
            )
            .unwrap();
        // Guard trigger is queued; the rebuild wires the new subscription.
        exec.spin_some(Duration::ZERO).await.unwrap();
        let rebuilt = loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::EntitiesRebuilt {
                break ev;
            }
        };
        assert_eq!(rebuilt.entities, Some(1));

        sub.handle_message(1);
        exec.spin_some(Duration::ZERO).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
