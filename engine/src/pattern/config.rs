use corelib::models::Strength;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("unusual_volume_multiplier must be at least 1, got {0}")]
    MultiplierBelowOne(f64),

    #[error("gamma_squeeze_threshold must be within (0, 1], got {0}")]
    GammaOutOfRange(f64),

    #[error("confidence cut points must satisfy 0 <= low <= medium <= high <= 1, got {low}/{medium}/{high}")]
    UnorderedConfidence { low: f64, medium: f64, high: f64 },

    #[error("{field} must be at least 1")]
    ZeroCount { field: &'static str },

    #[error("volume_min_samples ({min}) exceeds volume_window ({window})")]
    WarmupExceedsWindow { min: usize, window: usize },
}

/// Thresholds and cut points for pattern detection.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternConfig {
    /// Minimum absolute OI change at one strike for buildup / unwinding.
    pub oi_change_threshold: f64,
    /// Minimum premium (LTP) rise at the same strike for buildup.
    pub premium_change_threshold: f64,
    /// Floor on per-strike call+put volume before a spike is considered.
    pub volume_threshold: f64,
    /// Spot move, in percent, between consecutive snapshots.
    pub volatility_spike_threshold: f64,
    /// Volume must exceed this multiple of the trailing average.
    pub unusual_volume_multiplier: f64,
    /// Share of total OI inside the band around spot, in (0, 1].
    pub gamma_squeeze_threshold: f64,
    /// Half-width of the gamma band, in strike intervals.
    pub gamma_band_strikes: u32,
    /// Max pain move, in strike intervals.
    pub max_pain_deviation_threshold: f64,

    pub confidence_high: f64,
    pub confidence_medium: f64,
    /// Below this, a pattern is suppressed.
    pub confidence_low: f64,

    pub max_patterns_per_tick: usize,

    /// Trailing samples kept per strike for the volume average.
    pub volume_window: usize,
    /// Samples required before volume spikes are reported.
    pub volume_min_samples: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            oi_change_threshold: 5_000.0,
            premium_change_threshold: 5.0,
            volume_threshold: 1_000.0,
            volatility_spike_threshold: 1.0,
            unusual_volume_multiplier: 3.0,
            gamma_squeeze_threshold: 0.6,
            gamma_band_strikes: 2,
            max_pain_deviation_threshold: 2.0,
            confidence_high: 0.8,
            confidence_medium: 0.6,
            confidence_low: 0.4,
            max_patterns_per_tick: 10,
            volume_window: 20,
            volume_min_samples: 3,
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        let positive = [
            ("oi_change_threshold", self.oi_change_threshold),
            ("premium_change_threshold", self.premium_change_threshold),
            ("volume_threshold", self.volume_threshold),
            ("volatility_spike_threshold", self.volatility_spike_threshold),
            ("max_pain_deviation_threshold", self.max_pain_deviation_threshold),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ThresholdError::NotPositive { field, value });
            }
        }

        if !(self.unusual_volume_multiplier.is_finite() && self.unusual_volume_multiplier >= 1.0) {
            return Err(ThresholdError::MultiplierBelowOne(self.unusual_volume_multiplier));
        }

        let g = self.gamma_squeeze_threshold;
        if !(g > 0.0 && g <= 1.0) {
            return Err(ThresholdError::GammaOutOfRange(g));
        }

        let (low, medium, high) = (self.confidence_low, self.confidence_medium, self.confidence_high);
        if !(0.0 <= low && low <= medium && medium <= high && high <= 1.0) {
            return Err(ThresholdError::UnorderedConfidence { low, medium, high });
        }

        let counts = [
            ("gamma_band_strikes", self.gamma_band_strikes as usize),
            ("max_patterns_per_tick", self.max_patterns_per_tick),
            ("volume_window", self.volume_window),
            ("volume_min_samples", self.volume_min_samples),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ThresholdError::ZeroCount { field });
            }
        }

        if self.volume_min_samples > self.volume_window {
            return Err(ThresholdError::WarmupExceedsWindow {
                min: self.volume_min_samples,
                window: self.volume_window,
            });
        }

        Ok(())
    }

    /// Bucket a confidence. `None` means suppressed.
    pub fn strength(&self, confidence: f64) -> Option<Strength> {
        if confidence >= self.confidence_high {
            Some(Strength::High)
        } else if confidence >= self.confidence_medium {
            Some(Strength::Medium)
        } else if confidence >= self.confidence_low {
            Some(Strength::Low)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(PatternConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let cfg = PatternConfig {
            oi_change_threshold: 0.0,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ThresholdError::NotPositive {
                field: "oi_change_threshold",
                value: 0.0
            })
        );

        let cfg = PatternConfig {
            premium_change_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unordered_cut_points() {
        let cfg = PatternConfig {
            confidence_low: 0.7,
            confidence_medium: 0.6,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ThresholdError::UnorderedConfidence { .. })
        ));
    }

    #[test]
    fn rejects_warmup_longer_than_window() {
        let cfg = PatternConfig {
            volume_window: 2,
            volume_min_samples: 3,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ThresholdError::WarmupExceedsWindow { min: 3, window: 2 })
        );
    }

    #[test]
    fn buckets_by_cut_points() {
        let cfg = PatternConfig::default();
        assert_eq!(cfg.strength(0.95), Some(Strength::High));
        assert_eq!(cfg.strength(0.8), Some(Strength::High));
        assert_eq!(cfg.strength(0.65), Some(Strength::Medium));
        assert_eq!(cfg.strength(0.4), Some(Strength::Low));
        assert_eq!(cfg.strength(0.39), None);
    }
}
