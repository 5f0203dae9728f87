//! Dispatcher
//!
//! Fans events out to registered subscribers. Each subscriber gets its own
//! delivery worker and a bounded queue, so a slow or failing subscriber only
//! delays itself. When its queue is full, new events for that subscriber
//! are dropped and logged. Within one subscriber, events arrive in publish order,
//! which preserves per-instrument order as long as each instrument is
//! published from a single lane.

pub mod subscribers;

pub use subscribers::{ChannelSubscriber, LogSubscriber};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corelib::models::{Envelope, MarketEvent};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Downstream collaborator (dashboard, notification channel, sink).
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Deliver one event. Errors and panics are retried per the
    /// dispatcher's `DeliveryPolicy`.
    async fn deliver(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Attempts per event per subscriber, including the first.
    pub attempts: usize,
    /// Delay before retry n is `retry_delay * n`.
    pub retry_delay: Duration,
    /// Events buffered per subscriber before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(100),
            queue_capacity: 1_024,
        }
    }
}

struct Worker {
    name: String,
    tx: Sender<Arc<Envelope>>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    workers: Vec<Worker>,
}

pub struct Dispatcher {
    inner: Mutex<Inner>,
    policy: DeliveryPolicy,
}

impl Dispatcher {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    /// Register a subscriber and start its delivery worker.
    ///
    /// Must be called from within a Tokio runtime. Only events published
    /// after registration are delivered.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        let (tx, rx) = mpsc::channel(self.policy.queue_capacity.max(1));
        let name = subscriber.name().to_string();
        let span = info_span!("delivery", subscriber = %name);

        let handle = tokio::spawn(
            run_worker(subscriber, rx, self.policy.clone()).instrument(span),
        );

        info!(subscriber = %name, "subscriber registered");
        self.inner.lock().workers.push(Worker { name, tx, handle });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().workers.len()
    }

    /// Enqueue `event` for every subscriber. Never blocks on delivery.
    /// Returns the sequence number assigned to the event.
    pub fn publish(&self, instrument: &str, event: MarketEvent) -> u64 {
        let mut inner = self.inner.lock();

        inner.next_seq += 1;
        let seq = inner.next_seq;

        let envelope = Arc::new(Envelope {
            seq,
            instrument: instrument.to_string(),
            event,
        });

        for worker in &inner.workers {
            match worker.tx.try_send(Arc::clone(&envelope)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %worker.name, seq, %instrument, "subscriber queue full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(subscriber = %worker.name, seq, "delivery worker gone; event dropped");
                }
            }
        }

        seq
    }

    /// Stop accepting events, let every worker drain its queue, then return.
    pub async fn shutdown(&self) {
        let workers = std::mem::take(&mut self.inner.lock().workers);

        for Worker { name, tx, handle } in workers {
            drop(tx);
            if let Err(e) = handle.await {
                error!(subscriber = %name, error = %e, "delivery worker aborted");
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DeliveryPolicy::default())
    }
}

async fn run_worker(
    subscriber: Arc<dyn Subscriber>,
    mut rx: Receiver<Arc<Envelope>>,
    policy: DeliveryPolicy,
) {
    while let Some(envelope) = rx.recv().await {
        deliver_with_retry(subscriber.as_ref(), &envelope, &policy).await;
    }
    debug!("delivery worker stopped");
}

/// Returns whether the event was delivered.
async fn deliver_with_retry(
    subscriber: &dyn Subscriber,
    envelope: &Envelope,
    policy: &DeliveryPolicy,
) -> bool {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let outcome = AssertUnwindSafe(subscriber.deliver(envelope))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => warn!(
                seq = envelope.seq,
                attempt,
                error = %e,
                "delivery failed"
            ),
            Err(_) => error!(seq = envelope.seq, attempt, "subscriber panicked during delivery"),
        }

        if attempt < attempts {
            tokio::time::sleep(policy.retry_delay * attempt as u32).await;
        }
    }

    error!(
        seq = envelope.seq,
        instrument = %envelope.instrument,
        kind = envelope.event.kind(),
        attempts,
        "giving up on event for this subscriber"
    );
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use chrono::{TimeZone, Utc};
    use corelib::models::{AlertFiring, StaleData};
    use tracing_test::traced_test;

    fn alert(n: usize) -> MarketEvent {
        MarketEvent::Alert(AlertFiring {
            rule_id: format!("r-{n}"),
            value: n as f64,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 15, 4, 0, 0).unwrap(),
        })
    }

    fn policy() -> DeliveryPolicy {
        DeliveryPolicy {
            attempts: 3,
            retry_delay: Duration::from_millis(10),
            queue_capacity: 64,
        }
    }

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Subscriber for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _: &Envelope) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("webhook returned 500")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Subscriber for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn deliver(&self, _: &Envelope) -> anyhow::Result<()> {
            panic!("subscriber bug")
        }
    }

    /// Fails the first attempt of every event.
    struct Flaky {
        calls: AtomicUsize,
        inner: ChannelSubscriber,
    }

    #[async_trait]
    impl Subscriber for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn deliver(&self, envelope: &Envelope) -> anyhow::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                anyhow::bail!("transient");
            }
            self.inner.deliver(envelope).await
        }
    }

    #[tokio::test]
    async fn preserves_publish_order_per_instrument() {
        let dispatcher = Dispatcher::new(policy());
        let (sub, mut rx) = ChannelSubscriber::new("sink");
        dispatcher.register(Arc::new(sub));

        for n in 0..40 {
            let instrument = if n % 2 == 0 { "NIFTY" } else { "BANKNIFTY" };
            dispatcher.publish(instrument, alert(n));
        }

        let mut last_seq = 0;
        let mut nifty = Vec::new();
        for _ in 0..40 {
            let env = rx.recv().await.unwrap();
            assert!(env.seq > last_seq);
            last_seq = env.seq;
            if env.instrument == "NIFTY" {
                nifty.push(env.event);
            }
        }

        let expected: Vec<_> = (0..40).step_by(2).map(alert).collect();
        assert_eq!(nifty, expected);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn failing_subscribers_do_not_block_others() {
        let dispatcher = Dispatcher::new(policy());
        let failing = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let (good, mut rx) = ChannelSubscriber::new("good");

        dispatcher.register(failing.clone());
        dispatcher.register(Arc::new(Panicking));
        dispatcher.register(Arc::new(good));

        for n in 0..3 {
            dispatcher.publish("NIFTY", alert(n));
        }

        for n in 0..3 {
            assert_eq!(rx.recv().await.unwrap().event, alert(n));
        }

        dispatcher.shutdown().await;

        assert_eq!(failing.calls.load(Ordering::SeqCst), 9);
        assert!(logs_contain("webhook returned 500"));
        assert!(logs_contain("subscriber panicked during delivery"));
        assert!(logs_contain("giving up on event for this subscriber"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let dispatcher = Dispatcher::new(policy());
        let (inner, mut rx) = ChannelSubscriber::new("inner");
        dispatcher.register(Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            inner,
        }));

        dispatcher.publish("NIFTY", alert(1));
        dispatcher.publish("NIFTY", alert(2));

        assert_eq!(rx.recv().await.unwrap().event, alert(1));
        assert_eq!(rx.recv().await.unwrap().event, alert(2));
    }

    #[tokio::test]
    #[traced_test]
    async fn full_queue_drops_events_for_that_subscriber_only() {
        let dispatcher = Dispatcher::new(DeliveryPolicy {
            queue_capacity: 2,
            ..policy()
        });
        let (sub, mut rx) = ChannelSubscriber::new("sink");
        dispatcher.register(Arc::new(sub));

        // Workers have not run yet on this single-threaded runtime.
        let seqs: Vec<u64> = (0..5).map(|n| dispatcher.publish("NIFTY", alert(n))).collect();
        dispatcher.shutdown().await;

        let mut delivered = Vec::new();
        while let Some(env) = rx.recv().await {
            delivered.push(env.seq);
        }

        assert_eq!(delivered, seqs[..2].to_vec());
        assert!(logs_contain("subscriber queue full; event dropped"));
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events() {
        let dispatcher = Dispatcher::new(policy());
        let (sub, mut rx) = ChannelSubscriber::new("sink");
        dispatcher.register(Arc::new(sub));

        let stale = MarketEvent::StaleData(StaleData {
            instrument: "NIFTY".into(),
            snapshot_timestamp: Utc.with_ymd_and_hms(2026, 10, 15, 4, 0, 0).unwrap(),
            age_ms: 9_000,
        });
        let seq = dispatcher.publish("NIFTY", stale.clone());
        dispatcher.shutdown().await;

        assert_eq!(dispatcher.subscriber_count(), 0);
        let env = rx.recv().await.unwrap();
        assert_eq!((env.seq, env.event), (seq, stale));
        // Worker is gone, so the sender side is closed.
        assert!(rx.recv().await.is_none());
    }
}
