//! Process-wide context shared by nodes.
//!
//! The context owns the [`IntraProcessRouter`] and the service directory, so
//! every node created from it shares one routing namespace.

use std::sync::Arc;

use crate::entities::ServiceDirectory;
use crate::intra_process::IntraProcessRouter;

use super::base::Node;
use super::NodeOptions;

/// Shared state of a group of nodes.
pub struct Context {
    router: Arc<IntraProcessRouter>,
    services: Arc<ServiceDirectory>,
}

impl Context {
    /// Creates a context with an empty router and directory.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            router: IntraProcessRouter::new(),
            services: ServiceDirectory::new(),
        })
    }

    /// Intra-process router of this context.
    pub fn router(&self) -> &Arc<IntraProcessRouter> {
        &self.router
    }

    pub(crate) fn services(&self) -> &Arc<ServiceDirectory> {
        &self.services
    }

    /// Creates a node bound to this context.
    pub fn create_node(self: &Arc<Self>, name: impl Into<String>, options: NodeOptions) -> Arc<Node> {
        Node::new(self.clone(), name.into(), options)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
