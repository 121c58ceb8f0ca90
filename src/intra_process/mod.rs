//! Same-process message routing.
//!
//! - [`IdRegistry`] issues strictly increasing, never reused [`IntraProcessId`]s.
//! - [`IntraProcessRouter`] indexes endpoints by topic, gates them on QoS
//!   eligibility and delivers messages without aliasing between targets.

mod ids;
mod router;

pub use ids::{IdRegistry, IntraProcessId};
pub use router::{IntraProcessPublisher, IntraProcessRouter, IntraProcessSubscriber};
