//! Endpoint policies.
//!
//! This module groups the knobs that decide **whether** an endpoint may use
//! intra-process delivery and **how much** it buffers locally.
//!
//! ## Contents
//! - [`QoS`] history / depth / durability profile with eligibility checks
//! - [`History`], [`Durability`] the policy enums
//! - [`IntraProcessSetting`] per-endpoint override of the node default
//!
//! ## Quick wiring
//! ```text
//! Node::create_subscription(topic, qos, cb, options)
//!      └─► options.intra_process.resolve(node default)
//!           └─► true: qos.check_intra_process_subscription()? ─► router.register_subscription()
//! ```
//!
//! ## Defaults
//! - `QoS::default()` → keep_last(10), volatile.
//! - `IntraProcessSetting::NodeDefault`.

mod intra_process;
mod qos;

pub use intra_process::IntraProcessSetting;
pub use qos::{Durability, History, QoS};
