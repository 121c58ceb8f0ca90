//! Runtime core: queue, timers, entity collection and dispatch.
//!
//! The only types most users touch are [`EventsExecutor`] and its
//! [`ExecutorConfig`]; the rest is exposed for inspection and tests.
//!
//! Internal modules:
//! - [`executor`]: scheduling entry points and event dispatch;
//! - [`queue`]: FIFO of ready events with structural coalescing;
//! - [`timers`]: turns timer deadlines into ready events;
//! - [`collector`]: associated nodes and wake-callback wiring;
//! - [`builder`]: executor assembly with optional subscribers.

mod builder;
mod collector;
mod config;
mod executor;
mod queue;
mod timers;

pub use builder::ExecutorBuilder;
pub use collector::EntitiesCollector;
pub use config::ExecutorConfig;
pub use executor::{EventsExecutor, FutureReturnCode};
pub use queue::EventsQueue;
pub use timers::TimersManager;
