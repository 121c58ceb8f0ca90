//! Nodes: owners of callback groups and entity factories.
//!
//! A [`Node`] is created from a [`Context`], owns its callback groups and
//! exposes a notify [`GuardCondition`] that wakes the executor whenever an
//! entity is added.
//!
//! ```text
//! Context ──► Node ──► CallbackGroup(default, exclusive)
//!   │          │   └─► CallbackGroup(..) via create_callback_group
//!   │          ├─► notify GuardCondition ─► executor collector
//!   │          └─► has_executor: AtomicBool
//!   ├─► IntraProcessRouter
//!   └─► ServiceDirectory
//! ```

mod base;
mod context;
mod guard;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

pub use base::Node;
pub use context::Context;
pub use guard::GuardCondition;

use crate::entities::CallbackGroup;
use crate::policies::IntraProcessSetting;

static NODE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NODE_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Node-wide creation options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeOptions {
    /// Default for endpoints created with [`IntraProcessSetting::NodeDefault`].
    pub use_intra_process_comms: bool,
}

impl NodeOptions {
    /// Options with intra-process delivery switched on.
    pub fn intra_process() -> Self {
        Self {
            use_intra_process_comms: true,
        }
    }
}

/// Creation options of a subscription.
#[derive(Clone, Default)]
pub struct SubscriptionOptions {
    /// Intra-process delivery setting.
    pub intra_process: IntraProcessSetting,
    /// Group to place the subscription in; the node default if `None`.
    pub callback_group: Option<Arc<CallbackGroup>>,
}

impl SubscriptionOptions {
    /// Places the subscription in `group`.
    pub fn with_callback_group(mut self, group: Arc<CallbackGroup>) -> Self {
        self.callback_group = Some(group);
        self
    }

    /// Overrides the node's intra-process default.
    pub fn with_intra_process(mut self, setting: IntraProcessSetting) -> Self {
        self.intra_process = setting;
        self
    }
}
