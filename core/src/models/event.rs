use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AlertFiring, DerivedMetrics, PatternEvent};

/// Every configured provider failed for an instrument; the cache keeps
/// serving the last good snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutage {
    pub instrument: String,
    pub providers: Vec<String>,
    pub last_error: String,
    pub timestamp: DateTime<Utc>,
}

/// Analysis continued on a snapshot older than the cache TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleData {
    pub instrument: String,
    pub snapshot_timestamp: DateTime<Utc>,
    pub age_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum MarketEvent {
    Metrics(DerivedMetrics),
    Pattern(PatternEvent),
    Alert(AlertFiring),
    ProviderOutage(ProviderOutage),
    StaleData(StaleData),
}

impl MarketEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::Metrics(_) => "METRICS",
            MarketEvent::Pattern(_) => "PATTERN",
            MarketEvent::Alert(_) => "ALERT",
            MarketEvent::ProviderOutage(_) => "PROVIDER_OUTAGE",
            MarketEvent::StaleData(_) => "STALE_DATA",
        }
    }
}

/// Unit of delivery to subscribers. `seq` increases with every publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub seq: u64,
    pub instrument: String,
    pub event: MarketEvent,
}
