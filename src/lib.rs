//! # spinvisor
//!
//! **Spinvisor** is an event-driven callback executor for Rust.
//!
//! Nodes own timers, subscriptions, services, clients and custom waitables,
//! grouped into callback groups. Instead of polling every entity on each
//! iteration, each entity pushes a ready event into a single queue when it
//! has work, and the executor dispatches those events in arrival order.
//! Publishers and subscriptions in the same process can exchange messages
//! through an intra-process router that never aliases a message between
//! two consumers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Node A    │   │    Node B    │   │    Node C    │
//!     │ timers, subs │   │ services,    │   │ waitables    │
//!     │ (groups)     │   │ clients      │   │              │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ add_node         │ add_node         │ add_node
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventsExecutor                                                   │
//! │  - EntitiesCollector (wires wake callbacks, rebuilds on change)   │
//! │  - TimersManager     (deadlines ─► ready events)                  │
//! │  - EventsQueue       (FIFO of ReadyEvent, structural coalescing)  │
//! │  - Bus + SubscriberSet (observability)                            │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               ▼
//!     spin()          spin_some(max)     spin_all(max)   spin_once(max)
//!        └──────────────────┴────────┬─────────┴───────────────┘
//!                                    ▼
//!                          dispatch(ReadyEvent)
//!                      ├─ structural ─► rebuild entity table
//!                      ├─ stale      ─► StaleEventDropped
//!                      └─ live       ─► (exclusive permit) ─► execute()
//! ```
//!
//! ### Intra-process delivery
//! ```text
//! Publisher::publish(msg)
//!   └─► IntraProcessRouter::publish(pub_id, msg, keep_copy)
//!         ├─ every live subscription on the topic but the last: clone(msg)
//!         ├─ last subscription: msg moved (cloned when keep_copy)
//!         └─ SubscriptionIntraProcess::provide() ─► notify_ready()
//! ```
//!
//! ## Features
//! | Area               | Description                                                  | Key types / traits                           |
//! |--------------------|--------------------------------------------------------------|----------------------------------------------|
//! | **Executor**       | Event-driven dispatch with four scheduling policies.         | [`EventsExecutor`], [`ExecutorConfig`]       |
//! | **Entities**       | Timers, subscriptions, services, clients, waitables.         | [`Executable`], [`Timer`], [`Subscription`]  |
//! | **Groups**         | Mutually exclusive or reentrant callback scopes.             | [`CallbackGroup`], [`CallbackGroupType`]     |
//! | **Intra-process**  | Topic routing inside one process with QoS eligibility.       | [`IntraProcessRouter`], [`QoS`]              |
//! | **Subscriber API** | Hook into executor events (logging, metrics).                | [`Subscribe`]                                |
//! | **Errors**         | One typed error for every failure.                           | [`ExecutorError`]                            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use spinvisor::{
//!     Context, EventsExecutor, ExecutorConfig, NodeOptions, PublisherOptions, QoS,
//!     SubscriptionOptions,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn spinvisor::Subscribe>> = vec![Arc::new(spinvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn spinvisor::Subscribe>> = Vec::new();
//!
//!     let exec = EventsExecutor::builder(ExecutorConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let node = Context::new().create_node("talker", NodeOptions::intra_process());
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!     let tx = std::sync::Mutex::new(Some(tx));
//!     let _sub = node.create_subscription(
//!         "chatter",
//!         QoS::keep_last(10),
//!         move |msg: String| {
//!             if let Some(tx) = tx.lock().unwrap().take() {
//!                 let _ = tx.send(msg);
//!             }
//!         },
//!         SubscriptionOptions::default(),
//!     )?;
//!     let publisher =
//!         node.create_publisher::<String>("chatter", QoS::keep_last(10), PublisherOptions::default())?;
//!
//!     exec.add_node(&node)?;
//!     publisher.publish("hello".to_string());
//!     let got = exec.spin_until_complete(rx, Some(Duration::from_secs(1))).await?;
//!     println!("{got:?}");
//!     Ok(())
//! }
//! ```
mod core;
mod entities;
mod error;
mod events;
mod intra_process;
mod node;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    EntitiesCollector, EventsExecutor, EventsQueue, ExecutorBuilder, ExecutorConfig,
    FutureReturnCode, TimersManager,
};
pub use entities::{
    CallbackGroup, CallbackGroupType, Client, ClientBase, EntityKey, EntityKind, EntityRef,
    EventSource, Executable, MessageCallback, Publisher, PublisherOptions, ReadyEvent, Service,
    ServiceBase, ServiceDirectory, Subscription, SubscriptionBase, SubscriptionIntraProcess,
    Timer, Transport, Waitable, WakeCallback, WakeSlot, WeakEntity,
};
pub use error::ExecutorError;
pub use events::{Bus, Event, EventKind};
pub use intra_process::{
    IdRegistry, IntraProcessId, IntraProcessPublisher, IntraProcessRouter, IntraProcessSubscriber,
};
pub use node::{Context, GuardCondition, Node, NodeId, NodeOptions, SubscriptionOptions};
pub use policies::{Durability, History, IntraProcessSetting, QoS};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
