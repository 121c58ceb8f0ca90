//! Dispatchable entities and the groups that own them.
//!
//! This module provides:
//! - [`Executable`] the capability every entity implements, plus kind traits
//!   ([`SubscriptionBase`], [`ServiceBase`], [`ClientBase`], [`Waitable`])
//! - [`EntityRef`] / [`WeakEntity`] closed sums over the five kinds
//! - [`WakeSlot`] / [`ReadyEvent`] the wake-up signal path into the executor
//! - concrete entities: [`Timer`], [`Subscription`], [`SubscriptionIntraProcess`],
//!   [`Publisher`], [`Service`], [`Client`]
//! - [`CallbackGroup`] mutual-exclusion scope with per-kind enumeration
//!
//! ## Signal flow
//! ```text
//! entity has work ─► notify_ready() ─► WakeSlot callback ─► EventsQueue::push(ReadyEvent)
//!                                                               │
//! dispatch worker ◄─────────────── collector.resolve(key) ◄─────┘
//!        └─► (exclusive group permit) ─► entity.execute()
//! ```

mod buffer;
mod executable;
mod group;
mod publisher;
mod service;
mod subscription;
mod timer;
mod wake;

pub use executable::{
    ClientBase, EntityRef, Executable, ServiceBase, SubscriptionBase, Waitable, WeakEntity,
};
pub use group::{CallbackGroup, CallbackGroupType};
pub use publisher::{Publisher, PublisherOptions, Transport};
pub use service::{Client, Service, ServiceDirectory};
pub use subscription::{MessageCallback, Subscription, SubscriptionIntraProcess};
pub use timer::Timer;
pub use wake::{EntityKey, EntityKind, EventSource, ReadyEvent, WakeCallback, WakeSlot};
