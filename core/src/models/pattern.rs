use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    CallBuildup,
    PutBuildup,
    CallUnwinding,
    PutUnwinding,
    GammaSqueeze,
    MaxPainShift,
    VolumeSpike,
    VolatilitySpike,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternType::CallBuildup => "CALL_BUILDUP",
            PatternType::PutBuildup => "PUT_BUILDUP",
            PatternType::CallUnwinding => "CALL_UNWINDING",
            PatternType::PutUnwinding => "PUT_UNWINDING",
            PatternType::GammaSqueeze => "GAMMA_SQUEEZE",
            PatternType::MaxPainShift => "MAX_PAIN_SHIFT",
            PatternType::VolumeSpike => "VOLUME_SPIKE",
            PatternType::VolatilitySpike => "VOLATILITY_SPIKE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strength {
    Low,
    Medium,
    High,
}

/// A scored structural pattern detected on one tick of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEvent {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// Always within [0, 1].
    pub confidence: f64,
    pub strength: Strength,
    pub signals: BTreeSet<String>,
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
}
