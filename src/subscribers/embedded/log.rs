//! # LogWriter: tracing-backed event printer
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Use it for tests or demos; install a `tracing` subscriber to see output.
//!
//! ## Example output
//! ```text
//! INFO [node-added] node="talker" entities=3
//! INFO [spin-started] entry="spin_some"
//! INFO [spin-stopped] entry="spin_some" dispatched=2
//! INFO [cancel-requested]
//! DEBUG [stale-event] entity=#12
//! WARN [subscriber-overflow] subscriber="metrics" reason="full"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let node = e.node.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::NodeAdded => {
                tracing::info!(node, entities = ?e.entities, "[node-added]");
            }
            EventKind::NodeRemoved => {
                tracing::info!(node, "[node-removed]");
            }
            EventKind::EntitiesRebuilt => {
                tracing::debug!(entities = ?e.entities, "[entities-rebuilt]");
            }
            EventKind::SpinStarted => {
                tracing::info!(entry = reason, "[spin-started]");
            }
            EventKind::SpinStopped => {
                tracing::info!(entry = reason, dispatched = ?e.entities, "[spin-stopped]");
            }
            EventKind::CancelRequested => {
                tracing::info!("[cancel-requested]");
            }
            EventKind::StaleEventDropped => {
                tracing::debug!(entity = ?e.entity, "[stale-event]");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = node, reason, "[subscriber-overflow]");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = node, info = reason, "[subscriber-panicked]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
