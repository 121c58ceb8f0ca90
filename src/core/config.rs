//! # Executor configuration.
//!
//! Provides [`ExecutorConfig`], the settings consumed by
//! [`ExecutorBuilder`](crate::ExecutorBuilder).
//!
//! ## Sentinel values
//! - `workers = 0` → one worker
//! - `bus_capacity = 0` → clamped to 1

/// Configuration of an [`EventsExecutor`](crate::EventsExecutor).
///
/// ## Field semantics
/// - `workers`: parallel dispatch loops run by `spin()` (`0` = 1)
/// - `bus_capacity`: event bus ring buffer size (min 1)
///
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Number of worker loops draining the queue during `spin()`.
    ///
    /// Callbacks of a mutually exclusive group never overlap regardless of
    /// this value. `spin_some`, `spin_all` and `spin_once` always dispatch
    /// from the calling task.
    pub workers: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` messages skip
    /// older items.
    pub bus_capacity: usize,
}

impl ExecutorConfig {
    /// Worker count with the `0` sentinel resolved.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ExecutorConfig {
    /// Default configuration:
    ///
    /// - `workers = 1` (single dispatch loop, FIFO order preserved)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: 1,
            bus_capacity: 1024,
        }
    }
}
