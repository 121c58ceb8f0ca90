//! # Quality-of-service profile and intra-process eligibility.
//!
//! [`QoS`] carries the three policies the intra-process path cares about:
//! history, depth and durability. Everything else about QoS interpretation
//! belongs to the transport and is not modelled here.
//!
//! ## Eligibility
//! Intra-process delivery bypasses the durable, possibly bounded queue the
//! transport would provide, so a profile must satisfy:
//! ```text
//! publisher:     history != KeepAll  &&  durability == Volatile
//! subscription:  history != KeepAll  &&  durability == Volatile
//!                && !(history == KeepLast && depth == 0)
//! ```
//! The checks run at registration time; a profile that passes is never
//! re-validated per message.

use crate::error::ExecutorError;

/// History policy of an endpoint queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum History {
    /// Keep at most `depth` samples.
    KeepLast,
    /// Keep every sample (unbounded).
    KeepAll,
}

/// Durability policy of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Durability {
    /// Late joiners see nothing published before they matched.
    Volatile,
    /// Publisher replays its history to late joiners.
    TransientLocal,
    /// Whatever the transport picks.
    SystemDefault,
}

/// QoS profile for publishers and subscriptions.
///
/// ## Example
/// ```rust
/// use spinvisor::{Durability, History, QoS};
///
/// let qos = QoS::keep_last(5).durability(Durability::Volatile);
/// assert_eq!(qos.history, History::KeepLast);
/// assert!(qos.check_intra_process_subscription().is_ok());
///
/// let bad = QoS::keep_all();
/// assert!(bad.check_intra_process_publisher().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QoS {
    /// History policy.
    pub history: History,
    /// Queue depth (only meaningful with [`History::KeepLast`]).
    pub depth: usize,
    /// Durability policy.
    pub durability: Durability,
}

impl QoS {
    /// `KeepLast(depth)` + `Volatile`.
    pub fn keep_last(depth: usize) -> Self {
        Self {
            history: History::KeepLast,
            depth,
            durability: Durability::Volatile,
        }
    }

    /// `KeepAll` + `Volatile`.
    pub fn keep_all() -> Self {
        Self {
            history: History::KeepAll,
            depth: 0,
            durability: Durability::Volatile,
        }
    }

    /// Replaces the durability policy.
    #[must_use]
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Replaces the history policy.
    #[must_use]
    pub fn history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    /// Replaces the depth.
    #[must_use]
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Returns the bound of a local buffer built from this profile.
    ///
    /// `None` means unbounded (`KeepAll`).
    #[inline]
    pub fn buffer_bound(&self) -> Option<usize> {
        match self.history {
            History::KeepLast => Some(self.depth.max(1)),
            History::KeepAll => None,
        }
    }

    /// Checks whether a publisher with this profile may use intra-process delivery.
    pub fn check_intra_process_publisher(&self) -> Result<(), ExecutorError> {
        if self.history == History::KeepAll {
            return Err(ExecutorError::invalid_configuration(
                "intra-process communication is not allowed with keep all history qos policy",
            ));
        }
        if self.durability != Durability::Volatile {
            return Err(ExecutorError::invalid_configuration(
                "intra-process communication allowed only with volatile durability",
            ));
        }
        Ok(())
    }

    /// Checks whether a subscription with this profile may use intra-process delivery.
    pub fn check_intra_process_subscription(&self) -> Result<(), ExecutorError> {
        if self.history == History::KeepAll {
            return Err(ExecutorError::invalid_configuration(
                "intra-process communication is not allowed with keep all history qos policy",
            ));
        }
        if self.history == History::KeepLast && self.depth == 0 {
            return Err(ExecutorError::invalid_configuration(
                "intra-process communication is not allowed with keep last history and 0 depth qos policy",
            ));
        }
        if self.durability != Durability::Volatile {
            return Err(ExecutorError::invalid_configuration(
                "intra-process communication allowed only with volatile durability",
            ));
        }
        Ok(())
    }
}

impl Default for QoS {
    /// `KeepLast(10)` + `Volatile`.
    fn default() -> Self {
        Self::keep_last(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURABILITIES: [Durability; 3] = [
        Durability::Volatile,
        Durability::TransientLocal,
        Durability::SystemDefault,
    ];

    #[test]
    fn keep_all_is_never_eligible() {
        for durability in DURABILITIES {
            for depth in [0, 1, 10] {
                let qos = QoS::keep_all().durability(durability).depth(depth);
                assert!(matches!(
                    qos.check_intra_process_publisher(),
                    Err(ExecutorError::InvalidConfiguration { .. })
                ));
                assert!(matches!(
                    qos.check_intra_process_subscription(),
                    Err(ExecutorError::InvalidConfiguration { .. })
                ));
            }
        }
    }

    #[test]
    fn zero_depth_only_rejects_subscriptions() {
        let qos = QoS::keep_last(0);
        assert!(qos.check_intra_process_publisher().is_ok());
        assert!(qos.check_intra_process_subscription().is_err());
        assert!(QoS::keep_last(1).check_intra_process_subscription().is_ok());
    }

    #[test]
    fn non_volatile_rejected_regardless_of_history() {
        for durability in [Durability::TransientLocal, Durability::SystemDefault] {
            for depth in [1, 10, 100] {
                let qos = QoS::keep_last(depth).durability(durability);
                assert!(qos.check_intra_process_publisher().is_err());
                assert!(qos.check_intra_process_subscription().is_err());
            }
        }
    }

    #[test]
    fn buffer_bound_follows_history() {
        assert_eq!(QoS::keep_last(3).buffer_bound(), Some(3));
        assert_eq!(QoS::keep_all().buffer_bound(), None);
    }
}
