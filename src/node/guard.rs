//! # Notify guard condition.
//!
//! Cross-thread signal a node uses to tell its executor that the entity set
//! changed. The executor installs a [`WakeCallback`]; every [`trigger`]
//! invokes it with a structural [`ReadyEvent`].
//!
//! ## Rules
//! - Triggers arriving while no callback is installed are remembered and
//!   delivered once by the next `set_callback`, unless `discard_previous`.
//! - The callback runs under the guard's lock: after `set_callback(None, ..)`
//!   returns, no invocation is in flight.
//! - After [`fini`], `trigger` and `set_callback` fail with
//!   [`ExecutorError::SignalingFailure`].
//!
//! [`trigger`]: GuardCondition::trigger
//! [`fini`]: GuardCondition::fini

use std::sync::{Mutex, MutexGuard};

use crate::entities::{EntityKey, ReadyEvent, WakeCallback};
use crate::error::ExecutorError;

#[derive(Default)]
struct GuardState {
    callback: Option<WakeCallback>,
    unread: usize,
    finalized: bool,
}

/// Structural-change signal of a node.
pub struct GuardCondition {
    key: EntityKey,
    state: Mutex<GuardState>,
}

impl GuardCondition {
    pub(crate) fn new() -> Self {
        Self {
            key: EntityKey::next(),
            state: Mutex::new(GuardState::default()),
        }
    }

    /// Identity carried by the structural events of this guard.
    #[inline]
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Installs or clears the callback.
    pub fn set_callback(
        &self,
        callback: Option<WakeCallback>,
        discard_previous: bool,
    ) -> Result<(), ExecutorError> {
        let mut state = self.lock();
        if state.finalized {
            return Err(ExecutorError::signaling(
                "set_callback on a finalized guard condition",
            ));
        }
        if let Some(cb) = &callback {
            if state.unread > 0 && !discard_previous {
                cb(ReadyEvent::structural(self.key));
            }
            state.unread = 0;
        }
        state.callback = callback;
        Ok(())
    }

    /// Signals a structural change.
    pub fn trigger(&self) -> Result<(), ExecutorError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.finalized {
            return Err(ExecutorError::signaling(
                "trigger on a finalized guard condition",
            ));
        }
        match &state.callback {
            Some(cb) => cb(ReadyEvent::structural(self.key)),
            None => state.unread += 1,
        }
        Ok(())
    }

    /// Finalizes the guard; later calls fail.
    pub fn fini(&self) {
        let mut state = self.lock();
        state.finalized = true;
        state.callback = None;
    }

    /// True once [`fini`](Self::fini) was called.
    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    /// True if a callback is installed.
    pub fn has_callback(&self) -> bool {
        self.lock().callback.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for GuardCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardCondition")
            .field("key", &self.key)
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn counter() -> (WakeCallback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let cb: WakeCallback = Arc::new(move |ev: ReadyEvent| {
            assert!(ev.is_structural());
            h.fetch_add(1, AtomicOrdering::SeqCst);
        });
        (cb, hits)
    }

    #[test]
    fn early_triggers_delivered_once_on_install() {
        let guard = GuardCondition::new();
        guard.trigger().unwrap();
        guard.trigger().unwrap();

        let (cb, hits) = counter();
        guard.set_callback(Some(cb), false).unwrap();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);

        guard.trigger().unwrap();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn discard_previous_drops_early_triggers() {
        let guard = GuardCondition::new();
        guard.trigger().unwrap();
        let (cb, hits) = counter();
        guard.set_callback(Some(cb), true).unwrap();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn cleared_callback_never_fires() {
        let guard = GuardCondition::new();
        let (cb, hits) = counter();
        guard.set_callback(Some(cb), false).unwrap();
        guard.set_callback(None, false).unwrap();
        guard.trigger().unwrap();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn finalized_guard_rejects_signaling() {
        let guard = GuardCondition::new();
        guard.fini();
        let err = guard.trigger().unwrap_err();
        assert!(err.is_fatal());
        assert!(guard.set_callback(None, false).is_err());
    }
}
