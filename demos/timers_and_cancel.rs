//! # Example: timers_and_cancel
//!
//! Runs two timers under `spin()` and stops the executor from a timer callback.
//!
//! Shows how to:
//! - Attach the built-in [`LogWriter`] subscriber.
//! - Create timers in a reentrant callback group.
//! - Cancel a running `spin()` from another thread.
//! - Wait on a future with `spin_until_complete`.
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example timers_and_cancel --features logging
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use spinvisor::{
    CallbackGroupType, Context, EventsExecutor, ExecutorConfig, FutureReturnCode, LogWriter,
    NodeOptions, Subscribe,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let exec = EventsExecutor::builder(ExecutorConfig {
        workers: 2,
        ..ExecutorConfig::default()
    })
    .with_subscribers(subs)
    .build();

    let node = Context::new().create_node("clock", NodeOptions::default());
    let group = node.create_callback_group(CallbackGroupType::Reentrant);

    let fast_ticks = Arc::new(AtomicUsize::new(0));
    let ticks = fast_ticks.clone();
    let _fast = node.create_timer(
        Duration::from_millis(20),
        move || {
            let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(n, "fast tick");
        },
        Some(group.clone()),
    )?;

    // The slow timer stops the spin after its third tick.
    let handle: Arc<OnceLock<Weak<EventsExecutor>>> = Arc::new(OnceLock::new());
    let slow_ticks = Arc::new(AtomicUsize::new(0));
    let (h, ticks) = (handle.clone(), slow_ticks.clone());
    let _slow = node.create_timer(
        Duration::from_millis(100),
        move || {
            let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(n, "slow tick");
            if n == 3 {
                if let Some(exec) = h.get().and_then(Weak::upgrade) {
                    exec.cancel();
                }
            }
        },
        Some(group),
    )?;
    let _ = handle.set(Arc::downgrade(&exec));

    exec.add_node(&node)?;
    exec.spin().await?;
    tracing::info!(
        fast = fast_ticks.load(Ordering::Relaxed),
        slow = slow_ticks.load(Ordering::Relaxed),
        "spin cancelled"
    );

    let done = tokio::time::sleep(Duration::from_millis(150));
    match exec.spin_until_complete(done, Some(Duration::from_secs(1))).await? {
        FutureReturnCode::Success(()) => tracing::info!("sleep completed while spinning"),
        other => tracing::warn!(?other, "unexpected outcome"),
    }

    exec.remove_node(&node);
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
