use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "PRICE")]
    Price,
    #[serde(rename = "OI")]
    Oi,
    #[serde(rename = "PCR")]
    Pcr,
    #[serde(rename = "PATTERN")]
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCondition {
    Above,
    Below,
    Equals,
    Crosses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    InApp,
    Sms,
    Push,
    Webhook,
}

/// User-owned alert rule. Managed outside the core; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub user_id: String,
    pub instrument_id: String,
    pub alert_type: AlertType,
    pub condition: AlertCondition,
    pub target_value: f64,
    pub active: bool,
    pub channels: BTreeSet<Channel>,
}

/// One genuine condition transition of an active rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFiring {
    pub rule_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
