//! Bounded FIFO of pending messages shared by subscription paths.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Message FIFO; when bounded, the oldest message is dropped on overflow.
pub(crate) struct MessageBuffer<M> {
    bound: Option<usize>,
    items: Mutex<VecDeque<M>>,
}

impl<M> MessageBuffer<M> {
    pub(crate) fn new(bound: Option<usize>) -> Self {
        Self {
            bound,
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends `msg`; returns true if an older message was evicted.
    pub(crate) fn push(&self, msg: M) -> bool {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let evicted = match self.bound {
            Some(bound) if items.len() >= bound => items.pop_front().is_some(),
            _ => false,
        };
        items.push_back(msg);
        evicted
    }

    pub(crate) fn pop(&self) -> Option<M> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
