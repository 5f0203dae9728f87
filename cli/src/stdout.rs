use std::io::Write;

use async_trait::async_trait;
use corelib::models::Envelope;
use engine::Subscriber;

/// Writes each envelope as one JSON line on stdout.
pub struct JsonLinesSubscriber;

#[async_trait]
impl Subscriber for JsonLinesSubscriber {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let line = serde_json::to_string(envelope)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}
