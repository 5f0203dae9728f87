use anyhow::anyhow;
use async_trait::async_trait;
use corelib::models::{Envelope, MarketEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::Subscriber;

/// Logs every event through `tracing`.
pub struct LogSubscriber;

#[async_trait]
impl Subscriber for LogSubscriber {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let seq = envelope.seq;
        let instrument = &envelope.instrument;

        match &envelope.event {
            MarketEvent::Metrics(m) => debug!(
                seq,
                %instrument,
                ltp = m.ltp,
                pcr = ?m.pcr,
                max_pain = ?m.max_pain_strike,
                stale = m.stale,
                "metrics"
            ),
            MarketEvent::Pattern(p) => info!(
                seq,
                %instrument,
                pattern = %p.pattern_type,
                confidence = p.confidence,
                strength = ?p.strength,
                signals = ?p.signals,
                "pattern detected"
            ),
            MarketEvent::Alert(a) => info!(
                seq,
                %instrument,
                rule_id = %a.rule_id,
                value = a.value,
                "alert fired"
            ),
            MarketEvent::ProviderOutage(o) => warn!(
                seq,
                %instrument,
                providers = ?o.providers,
                last_error = %o.last_error,
                "provider outage"
            ),
            MarketEvent::StaleData(s) => warn!(
                seq,
                %instrument,
                age_ms = s.age_ms,
                snapshot_ts = %s.snapshot_timestamp,
                "analysing stale snapshot"
            ),
        }

        Ok(())
    }
}

/// Forwards envelopes into an in-process channel.
pub struct ChannelSubscriber {
    name: String,
    tx: UnboundedSender<Envelope>,
}

impl ChannelSubscriber {
    pub fn new(name: impl Into<String>) -> (Self, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| anyhow!("receiver for {} dropped", self.name))
    }
}
