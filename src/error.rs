//! Error types used by the executor, the entity factories and the intra-process router.
//!
//! A single enum, [`ExecutorError`], covers every failure the crate reports.
//! It provides helper methods (`as_label`, `as_message`) for logs and metrics,
//! plus [`ExecutorError::is_fatal`] to single out broken wake-up signaling.
//!
//! ## Propagation
//! - Configuration and ownership errors surface at the violating call and
//!   leave nothing registered behind.
//! - Signaling failures are escalated, never retried: a lost wake-up would
//!   silently starve an entity.
//! - Lookups of destroyed endpoints are **not** errors; they resolve to `None`.

use thiserror::Error;

/// # Errors produced by the executor and the entity registration surface.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// QoS profile is not eligible for intra-process delivery.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Which eligibility rule was violated.
        reason: String,
    },

    /// Node is already associated with an executor.
    #[error("node '{node}' has already been added to an executor")]
    AlreadyAssociated {
        /// Name of the offending node.
        node: String,
    },

    /// Callback group does not belong to the target node.
    #[error("callback group not in node '{node}'")]
    CrossOwnershipViolation {
        /// Name of the node the entity was created on.
        node: String,
    },

    /// Guard-condition trigger or callback registration failed.
    #[error("signaling failure: {reason}")]
    SignalingFailure {
        /// What could not be signaled.
        reason: String,
    },

    /// Argument rejected by a scheduling entry point.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// A `spin*` call was made while another one is running.
    #[error("spin called while already spinning")]
    AlreadySpinning,

    /// No live service is registered under the requested name.
    #[error("service '{service}' is not available")]
    ServiceUnavailable {
        /// Requested service name.
        service: String,
    },
}

impl ExecutorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use spinvisor::ExecutorError;
    ///
    /// let err = ExecutorError::AlreadySpinning;
    /// assert_eq!(err.as_label(), "executor_already_spinning");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecutorError::InvalidConfiguration { .. } => "qos_invalid_configuration",
            ExecutorError::AlreadyAssociated { .. } => "node_already_associated",
            ExecutorError::CrossOwnershipViolation { .. } => "group_cross_ownership",
            ExecutorError::SignalingFailure { .. } => "guard_signaling_failure",
            ExecutorError::InvalidArgument { .. } => "executor_invalid_argument",
            ExecutorError::AlreadySpinning => "executor_already_spinning",
            ExecutorError::ServiceUnavailable { .. } => "service_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ExecutorError::InvalidConfiguration { reason } => format!("qos: {reason}"),
            ExecutorError::AlreadyAssociated { node } => format!("node={node} already associated"),
            ExecutorError::CrossOwnershipViolation { node } => {
                format!("group not owned by node={node}")
            }
            ExecutorError::SignalingFailure { reason } => format!("signal: {reason}"),
            ExecutorError::InvalidArgument { reason } => format!("argument: {reason}"),
            ExecutorError::AlreadySpinning => "already spinning".to_string(),
            ExecutorError::ServiceUnavailable { service } => format!("service={service} missing"),
        }
    }

    /// Indicates whether the error breaks the wake-up contract.
    ///
    /// Returns `true` only for [`ExecutorError::SignalingFailure`].
    ///
    /// # Example
    /// ```
    /// use spinvisor::ExecutorError;
    ///
    /// let err = ExecutorError::SignalingFailure { reason: "finalized".into() };
    /// assert!(err.is_fatal());
    /// assert!(!ExecutorError::AlreadySpinning.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutorError::SignalingFailure { .. })
    }

    pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
        ExecutorError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn signaling(reason: impl Into<String>) -> Self {
        ExecutorError::SignalingFailure {
            reason: reason.into(),
        }
    }
}
