//! # Per-endpoint intra-process switch.

/// Whether an endpoint should use intra-process delivery.
///
/// [`IntraProcessSetting::NodeDefault`] defers to
/// [`NodeOptions::use_intra_process_comms`](crate::NodeOptions).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntraProcessSetting {
    /// Always register with the intra-process router.
    Enable,
    /// Never register with the intra-process router.
    Disable,
    /// Use the node's setting.
    #[default]
    NodeDefault,
}

impl IntraProcessSetting {
    /// Resolves the setting against the node default.
    #[inline]
    pub fn resolve(self, node_default: bool) -> bool {
        match self {
            IntraProcessSetting::Enable => true,
            IntraProcessSetting::Disable => false,
            IntraProcessSetting::NodeDefault => node_default,
        }
    }
}
