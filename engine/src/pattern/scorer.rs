/// One contributing measurement of a pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub threshold: f64,
    pub observed: f64,
    pub weight: f64,
}

impl Signal {
    pub fn new(threshold: f64, observed: f64, weight: f64) -> Self {
        Self {
            threshold,
            observed,
            weight,
        }
    }
}

/// Combines the signals of one pattern into a confidence in [0, 1].
///
/// Detectors clamp whatever an implementation returns, so a scorer only
/// needs to be monotonic in how far signals exceed their thresholds.
pub trait ConfidenceScorer: Send + Sync {
    fn score(&self, signals: &[Signal]) -> f64;
}

/// Each signal scores `0.5 + 0.5 * (1 - threshold / observed)` once past its
/// threshold (0.5 at the threshold, approaching 1 as the excess grows) and
/// `0.5 * observed / threshold` below it. Scores are combined as a
/// weight-normalised sum.
///
/// Magnitudes are compared, so callers may pass signed deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaturatingExcessScorer;

impl SaturatingExcessScorer {
    fn signal_score(signal: &Signal) -> f64 {
        let observed = signal.observed.abs();
        let threshold = signal.threshold.abs();

        if !observed.is_finite() || !threshold.is_finite() {
            return 0.0;
        }

        if threshold == 0.0 {
            return if observed > 0.0 { 1.0 } else { 0.0 };
        }

        if observed > threshold {
            0.5 + 0.5 * (1.0 - threshold / observed)
        } else {
            0.5 * observed / threshold
        }
    }
}

impl ConfidenceScorer for SaturatingExcessScorer {
    fn score(&self, signals: &[Signal]) -> f64 {
        let total_weight: f64 = signals.iter().map(|s| s.weight.max(0.0)).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }

        let weighted: f64 = signals
            .iter()
            .map(|s| s.weight.max(0.0) * Self::signal_score(s))
            .sum();

        (weighted / total_weight).clamp(0.0, 1.0)
    }
}
