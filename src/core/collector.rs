//! # Entity collector: node set and wake-callback wiring.
//!
//! The collector is the only place where the dispatch table changes. It holds
//! nodes weakly, wires every entity of every live node into the executor, and
//! answers "which entity does this ready event belong to" for dispatch.
//!
//! ## Architecture
//! ```text
//! add_node(node)
//!   ├─ node.has_executor.swap(true) ── was true ─► Err(AlreadyAssociated)
//!   ├─ guard.set_callback(push structural event, discard_previous = true)
//!   └─ wire every entity:   timers ─► TimersManager::add_timer
//!                           others ─► set_wake_callback(push into EventsQueue)
//!                                     + one ready event per buffered work item
//!
//! structural event ─► execute(): clear timers, rewire every live node,
//!                                clear callbacks of entities that disappeared
//!
//! remove_node(node)
//!   ├─ guard.set_callback(None)
//!   ├─ clear callbacks of the node's entities (takeable groups, then table)
//!   └─ drop table entries, erase node, has_executor = false
//! ```
//!
//! ## Rules
//! - Structural mutation takes the write side of one coarse lock; dispatch
//!   lookups take the read side.
//! - Nodes and entities are held weakly; dead ones are skipped, never errors.
//! - After `remove_node` returns, no wake callback of that node fires again.
//! - Work buffered on an entity before it is first wired is signaled when
//!   its callback is installed, so nothing waits unseen.

use std::collections::HashMap;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::entities::{CallbackGroup, EntityKey, EntityRef, WakeCallback, WeakEntity};
use crate::error::ExecutorError;
use crate::node::{Node, NodeId};

use super::queue::EventsQueue;
use super::timers::TimersManager;

struct Entry {
    entity: WeakEntity,
    group: Weak<CallbackGroup>,
    node: NodeId,
}

#[derive(Default)]
struct CollectorState {
    nodes: Vec<(NodeId, Weak<Node>)>,
    entities: HashMap<EntityKey, Entry>,
}

/// Live entity resolved for dispatch.
pub(crate) struct Resolved {
    pub(crate) entity: EntityRef,
    pub(crate) group: Arc<CallbackGroup>,
}

/// Registry of associated nodes and their wired entities.
pub struct EntitiesCollector {
    state: RwLock<CollectorState>,
    wake: WakeCallback,
    timers: Arc<TimersManager>,
}

impl EntitiesCollector {
    pub(crate) fn new(queue: Arc<EventsQueue>, timers: Arc<TimersManager>) -> Self {
        Self {
            state: RwLock::new(CollectorState::default()),
            wake: Arc::new(move |ev| queue.push(ev)),
            timers,
        }
    }

    /// Associates `node` and wires its entities; returns how many were wired.
    pub fn add_node(&self, node: &Arc<Node>) -> Result<usize, ExecutorError> {
        if node
            .associated_with_executor()
            .swap(true, AtomicOrdering::AcqRel)
        {
            return Err(ExecutorError::AlreadyAssociated {
                node: node.name().to_string(),
            });
        }

        let mut state = self.write();
        // Triggers from before this point are covered by the wiring below.
        if let Err(e) = node
            .notify_guard_condition()
            .set_callback(Some(self.wake.clone()), true)
        {
            node.associated_with_executor()
                .store(false, AtomicOrdering::Release);
            return Err(e);
        }
        let wired = self.wire_node(&mut state, node);
        state.nodes.push((node.id(), Arc::downgrade(node)));
        Ok(wired)
    }

    /// Detaches `node`; returns false (no-op) if it was not associated here.
    pub fn remove_node(&self, node: &Arc<Node>) -> bool {
        let mut state = self.write();
        let Some(pos) = state.nodes.iter().position(|(id, _)| *id == node.id()) else {
            return false;
        };

        release_guard(node);
        self.unwire_node(&mut state, node);
        state.nodes.remove(pos);
        node.associated_with_executor()
            .store(false, AtomicOrdering::Release);
        true
    }

    /// Full structural rebuild; returns the number of live entities wired.
    pub fn execute(&self) -> usize {
        let mut state = self.write();
        self.timers.clear_all();
        let previous = std::mem::take(&mut state.entities);

        state.nodes.retain(|(_, n)| n.strong_count() > 0);
        let nodes: Vec<Arc<Node>> = state
            .nodes
            .iter()
            .filter_map(|(_, n)| n.upgrade())
            .collect();
        for node in &nodes {
            self.wire_node(&mut state, node);
        }

        for (key, entry) in previous {
            if state.entities.contains_key(&key) {
                continue;
            }
            if let Some(entity) = entry.entity.upgrade() {
                self.unwire(&entity);
            }
        }
        state.entities.len()
    }

    /// True if a node with `id` is associated.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.read().nodes.iter().any(|(n, _)| *n == id)
    }

    /// Number of associated nodes (live or not yet pruned).
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    /// Number of entities in the dispatch table.
    pub fn entity_count(&self) -> usize {
        self.read().entities.len()
    }

    /// Resolves a ready event key to a live entity and its live group.
    pub(crate) fn resolve(&self, key: EntityKey) -> Option<Resolved> {
        let state = self.read();
        let entry = state.entities.get(&key)?;
        Some(Resolved {
            entity: entry.entity.upgrade()?,
            group: entry.group.upgrade()?,
        })
    }

    fn wire_node(&self, state: &mut CollectorState, node: &Arc<Node>) -> usize {
        let mut wired = 0;
        for group in node.callback_groups() {
            for entity in group.collect_entities() {
                self.wire(&entity);
                state.entities.insert(
                    entity.key(),
                    Entry {
                        entity: entity.downgrade(),
                        group: Arc::downgrade(&group),
                        node: node.id(),
                    },
                );
                wired += 1;
            }
        }
        wired
    }

    fn unwire_node(&self, state: &mut CollectorState, node: &Arc<Node>) {
        for group in node.callback_groups() {
            if !group.can_be_taken_from() {
                continue;
            }
            for entity in group.collect_entities() {
                self.unwire(&entity);
            }
        }

        // Entities of groups skipped above are still in the table.
        let id = node.id();
        state.entities.retain(|_, entry| {
            if entry.node != id {
                return true;
            }
            if let Some(entity) = entry.entity.upgrade() {
                self.unwire(&entity);
            }
            false
        });
    }

    fn wire(&self, entity: &EntityRef) {
        match entity {
            EntityRef::Timer(timer) => self.timers.add_timer(timer),
            other => other.as_executable().set_wake_callback(self.wake.clone()),
        }
    }

    fn unwire(&self, entity: &EntityRef) {
        match entity {
            EntityRef::Timer(timer) => self.timers.remove_timer(timer),
            other => other.as_executable().clear_wake_callback(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CollectorState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CollectorState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the node's guard callback; a finalized guard has none left.
fn release_guard(node: &Node) {
    let guard = node.notify_guard_condition();
    if guard.is_finalized() {
        return;
    }
    if let Err(e) = guard.set_callback(None, false) {
        tracing::warn!(node = %node.name(), error = %e, "failed to clear guard callback");
    }
}

impl Drop for EntitiesCollector {
    fn drop(&mut self) {
        let state = self.write();
        for node in state.nodes.iter().filter_map(|(_, n)| n.upgrade()) {
            release_guard(&node);
            node.associated_with_executor()
                .store(false, AtomicOrdering::Release);
        }
        for entity in state.entities.values().filter_map(|e| e.entity.upgrade()) {
            self.unwire(&entity);
        }
    }
}
