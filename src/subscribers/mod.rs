//! # Event subscribers for the executor.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   EventsExecutor ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                     │
//!                                                     ▼
//!                                          SubscriberSet::emit(&Event)
//!                                           ┌─────────┼─────────┐
//!                                           ▼         ▼         ▼
//!                                       LogWriter  Metrics   Custom ...
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
