//! # Example: pubsub_intra_process
//!
//! Demonstrates same-process publish/subscribe with a custom event subscriber.
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait to watch executor events.
//! - Create an intra-process publisher and two subscriptions on one topic.
//! - Plug a [`Transport`] in for remote readers.
//! - Drain work with `spin_some` / `spin_all`.
//!
//! ## Flow
//! ```text
//! Publisher::publish(msg)
//!     ├─► IntraProcessRouter::publish() ──► SubscriptionIntraProcess × 2 (own copies)
//!     │         └─► notify_ready() ──► EventsQueue
//!     └─► Transport::publish()  (only when remote readers exist)
//!
//! EventsExecutor::spin_all() ──► dispatch ──► subscription callbacks
//!     └─► Bus ──► subscriber_listener ──► ConsoleSubscriber.on_event()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example pubsub_intra_process
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use spinvisor::{
    Context, Event, EventKind, EventsExecutor, ExecutorConfig, NodeOptions, PublisherOptions,
    QoS, Subscribe, SubscriptionOptions, Transport,
};

/// Prints selected executor events.
struct ConsoleSubscriber;

#[async_trait::async_trait]
impl Subscribe for ConsoleSubscriber {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::NodeAdded => println!(
                "[sub] node added:   node={} entities={}",
                ev.node.as_deref().unwrap_or("<unknown>"),
                ev.entities.unwrap_or(0)
            ),
            EventKind::EntitiesRebuilt => {
                println!("[sub] rebuilt:      entities={}", ev.entities.unwrap_or(0))
            }
            EventKind::SpinStopped => println!(
                "[sub] spin stopped: entry={} dispatched={}",
                ev.reason.as_deref().unwrap_or("<unknown>"),
                ev.entities.unwrap_or(0)
            ),
            EventKind::StaleEventDropped => println!(
                "[sub] stale event:  entity={}",
                ev.entity.map(|k| k.to_string()).unwrap_or_default()
            ),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Pretends one remote reader listens on every topic.
#[derive(Default)]
struct LoopbackTransport {
    sent: AtomicUsize,
}

impl Transport<String> for LoopbackTransport {
    fn publish(&self, topic: &str, msg: String) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        println!("[net] {topic}: {msg}");
    }

    fn subscription_count(&self, _topic: &str) -> usize {
        1
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(ConsoleSubscriber)];
    let exec = EventsExecutor::builder(ExecutorConfig::default())
        .with_subscribers(subs)
        .build();

    let ctx = Context::new();
    let node = ctx.create_node("talker_listener", NodeOptions::intra_process());

    let first = node.create_subscription(
        "chatter",
        QoS::keep_last(10),
        |mut msg: String| {
            msg.push_str(" (seen by first)");
            println!("[first]  {msg}");
        },
        SubscriptionOptions::default(),
    )?;
    let _second = node.create_subscription(
        "chatter",
        QoS::keep_last(10),
        |msg: String| println!("[second] {msg}"),
        SubscriptionOptions::default(),
    )?;

    let transport = Arc::new(LoopbackTransport::default());
    let publisher = node.create_publisher::<String>(
        "chatter",
        QoS::keep_last(10),
        PublisherOptions {
            transport: Some(transport.clone()),
            ..PublisherOptions::default()
        },
    )?;

    exec.add_node(&node)?;
    exec.spin_some(Duration::ZERO).await?;

    for i in 0..3 {
        publisher.publish(format!("hello #{i}"));
    }
    let n = exec.spin_all(Duration::from_millis(100)).await?;
    println!("dispatched {n} events, {} sent remotely", transport.sent.load(Ordering::Relaxed));

    // A destroyed subscription never sees messages queued for it.
    publisher.publish("after drop".into());
    drop(first);
    exec.spin_all(Duration::from_millis(100)).await?;

    exec.remove_node(&node);
    // Let the subscriber drain before exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
