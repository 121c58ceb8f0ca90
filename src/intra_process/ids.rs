//! # Intra-process id issuance.
//!
//! [`IdRegistry`] hands out ids that are strictly increasing for the lifetime
//! of the registry. There is no release operation: an id stays burned even
//! after its endpoint is destroyed, so two endpoints never alias.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Id of a publisher or subscription registered with the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntraProcessId(u64);

impl IntraProcessId {
    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IntraProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipc:{}", self.0)
    }
}

/// Lock-free, monotonic id allocator.
#[derive(Debug)]
pub struct IdRegistry {
    next: AtomicU64,
}

impl IdRegistry {
    /// Creates a registry whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id, greater than every id returned before.
    #[inline]
    pub fn allocate(&self) -> IntraProcessId {
        IntraProcessId(self.next.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
