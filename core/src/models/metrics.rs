use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Change of a field between two consecutive snapshots.
///
/// `percent` is `None` when the previous value is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub absolute: f64,
    pub percent: Option<f64>,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        absolute: 0.0,
        percent: Some(0.0),
    };

    pub fn between(previous: f64, current: f64) -> Self {
        let absolute = current - previous;
        let percent = (previous != 0.0).then(|| absolute / previous * 100.0);
        Self { absolute, percent }
    }
}

/// Current values and velocities for one strike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeMetrics {
    pub strike: f64,

    #[serde(rename = "callOI")]
    pub call_oi: f64,
    #[serde(rename = "putOI")]
    pub put_oi: f64,
    #[serde(rename = "callLTP")]
    pub call_ltp: f64,
    #[serde(rename = "putLTP")]
    pub put_ltp: f64,
    pub call_volume: f64,
    pub put_volume: f64,

    #[serde(rename = "callOIVelocity")]
    pub call_oi_velocity: Velocity,
    #[serde(rename = "putOIVelocity")]
    pub put_oi_velocity: Velocity,
    #[serde(rename = "callLTPVelocity")]
    pub call_ltp_velocity: Velocity,
    #[serde(rename = "putLTPVelocity")]
    pub put_ltp_velocity: Velocity,
}

impl StrikeMetrics {
    pub fn total_oi(&self) -> f64 {
        self.call_oi + self.put_oi
    }

    pub fn total_volume(&self) -> f64 {
        self.call_volume + self.put_volume
    }
}

/// Metrics derived from the current snapshot and its immediate predecessor.
///
/// `pcr` is `None` (undefined) when total call OI is zero. `baseline` marks
/// metrics computed without a predecessor, in which case all velocities are
/// zero. `stale` is set when the snapshot was served past its TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub ltp: f64,
    pub spot_change_percent: Option<f64>,
    #[serde(rename = "totalCallOI")]
    pub total_call_oi: f64,
    #[serde(rename = "totalPutOI")]
    pub total_put_oi: f64,
    pub pcr: Option<f64>,
    pub max_pain_strike: Option<f64>,
    pub strike_interval: Option<f64>,
    pub strikes: Vec<StrikeMetrics>,
    pub baseline: bool,
    pub stale: bool,
}

impl DerivedMetrics {
    pub fn total_oi(&self) -> f64 {
        self.total_call_oi + self.total_put_oi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_guards_zero_denominator() {
        let v = Velocity::between(0.0, 500.0);
        assert_eq!(v.absolute, 500.0);
        assert_eq!(v.percent, None);

        let v = Velocity::between(200.0, 250.0);
        assert_eq!(v.absolute, 50.0);
        assert_eq!(v.percent, Some(25.0));
    }
}
