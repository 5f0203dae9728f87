//! PatternDetector
//!
//! Each pattern type has its own rule over the current metrics (whose
//! velocities are already current-minus-previous) plus the per-instrument
//! `PatternState`. Rules are independent; several may fire on one tick.
//! At most one event per pattern type is produced per tick: the strongest
//! qualifying strike sets the confidence and every qualifying strike adds
//! its tags.

use std::collections::BTreeSet;
use std::sync::Arc;

use corelib::models::{DerivedMetrics, PatternEvent, PatternType, StrikeMetrics};
use tracing::debug;

use super::{ConfidenceScorer, PatternConfig, PatternState, SaturatingExcessScorer, Signal};

#[derive(Debug, Clone, Copy)]
enum Side {
    Call,
    Put,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::Call => "CALL",
            Side::Put => "PUT",
        }
    }

    fn oi_delta(self, s: &StrikeMetrics) -> f64 {
        match self {
            Side::Call => s.call_oi_velocity.absolute,
            Side::Put => s.put_oi_velocity.absolute,
        }
    }

    fn ltp_delta(self, s: &StrikeMetrics) -> f64 {
        match self {
            Side::Call => s.call_ltp_velocity.absolute,
            Side::Put => s.put_ltp_velocity.absolute,
        }
    }

    fn buildup(self) -> PatternType {
        match self {
            Side::Call => PatternType::CallBuildup,
            Side::Put => PatternType::PutBuildup,
        }
    }

    fn unwinding(self) -> PatternType {
        match self {
            Side::Call => PatternType::CallUnwinding,
            Side::Put => PatternType::PutUnwinding,
        }
    }
}

struct Candidate {
    pattern: PatternType,
    confidence: f64,
    signals: BTreeSet<String>,
}

pub struct PatternDetector {
    config: Arc<PatternConfig>,
    scorer: Arc<dyn ConfidenceScorer>,
}

impl PatternDetector {
    pub fn new(config: Arc<PatternConfig>) -> Self {
        Self {
            config,
            scorer: Arc::new(SaturatingExcessScorer),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Evaluate every rule for one tick, then roll `state` forward.
    ///
    /// Returned events are sorted by confidence (highest first) and capped
    /// at `max_patterns_per_tick`. Patterns scoring below the low cut point
    /// are dropped.
    pub fn detect(
        &self,
        metrics: &DerivedMetrics,
        previous: Option<&DerivedMetrics>,
        state: &mut PatternState,
    ) -> Vec<PatternEvent> {
        let candidates = [
            self.buildup(metrics, Side::Call),
            self.buildup(metrics, Side::Put),
            self.unwinding(metrics, Side::Call),
            self.unwinding(metrics, Side::Put),
            self.volume_spike(metrics, state),
            self.gamma_squeeze(metrics),
            self.max_pain_shift(metrics, previous, state),
            self.volatility_spike(metrics),
        ];

        state.record_volumes(&metrics.strikes, self.config.volume_window);
        state.set_last_max_pain(metrics.max_pain_strike);

        let mut events: Vec<PatternEvent> = candidates
            .into_iter()
            .flatten()
            .filter_map(|c| {
                let Some(strength) = self.config.strength(c.confidence) else {
                    debug!(
                        instrument = %metrics.instrument,
                        pattern = %c.pattern,
                        confidence = c.confidence,
                        "pattern below confidence floor"
                    );
                    return None;
                };

                Some(PatternEvent {
                    pattern_type: c.pattern,
                    confidence: c.confidence,
                    strength,
                    signals: c.signals,
                    instrument: metrics.instrument.clone(),
                    timestamp: metrics.timestamp,
                })
            })
            .collect();

        events.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.pattern_type.cmp(&b.pattern_type))
        });
        events.truncate(self.config.max_patterns_per_tick);

        events
    }

    fn score(&self, signals: &[Signal]) -> f64 {
        let raw = self.scorer.score(signals);
        if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 }
    }

    /// Runs `rule` on every strike and folds the qualifying ones into one
    /// candidate.
    fn scan_strikes<F>(&self, metrics: &DerivedMetrics, pattern: PatternType, rule: F) -> Option<Candidate>
    where
        F: Fn(&StrikeMetrics) -> Option<(Vec<Signal>, Vec<String>)>,
    {
        let mut confidence: Option<f64> = None;
        let mut tags = BTreeSet::new();

        for strike in &metrics.strikes {
            let Some((signals, strike_tags)) = rule(strike) else {
                continue;
            };

            let score = self.score(&signals);
            confidence = Some(confidence.map_or(score, |c| c.max(score)));
            tags.extend(strike_tags);
        }

        confidence.map(|confidence| Candidate {
            pattern,
            confidence,
            signals: tags,
        })
    }

    /// OI and premium both rising past their thresholds at the same strike.
    fn buildup(&self, metrics: &DerivedMetrics, side: Side) -> Option<Candidate> {
        let cfg = &self.config;

        self.scan_strikes(metrics, side.buildup(), |s| {
            let d_oi = side.oi_delta(s);
            let d_ltp = side.ltp_delta(s);

            if d_oi > cfg.oi_change_threshold && d_ltp > 0.0 && d_ltp > cfg.premium_change_threshold {
                Some((
                    vec![
                        Signal::new(cfg.oi_change_threshold, d_oi, 0.6),
                        Signal::new(cfg.premium_change_threshold, d_ltp, 0.4),
                    ],
                    vec![
                        format!("{}_OI_DELTA@{}", side.label(), s.strike),
                        format!("{}_LTP_DELTA@{}", side.label(), s.strike),
                    ],
                ))
            } else {
                None
            }
        })
    }

    /// OI falling past the threshold while premium falls.
    fn unwinding(&self, metrics: &DerivedMetrics, side: Side) -> Option<Candidate> {
        let cfg = &self.config;

        self.scan_strikes(metrics, side.unwinding(), |s| {
            let d_oi = side.oi_delta(s);
            let d_ltp = side.ltp_delta(s);

            if d_oi < -cfg.oi_change_threshold && d_ltp < 0.0 {
                Some((
                    vec![
                        Signal::new(cfg.oi_change_threshold, d_oi, 0.7),
                        Signal::new(cfg.premium_change_threshold, d_ltp, 0.3),
                    ],
                    vec![
                        format!("{}_OI_DROP@{}", side.label(), s.strike),
                        format!("{}_LTP_DROP@{}", side.label(), s.strike),
                    ],
                ))
            } else {
                None
            }
        })
    }

    /// Strike volume above the floor and above multiplier × trailing average.
    /// Silent until a strike has `volume_min_samples` of history.
    fn volume_spike(&self, metrics: &DerivedMetrics, state: &PatternState) -> Option<Candidate> {
        let cfg = &self.config;

        self.scan_strikes(metrics, PatternType::VolumeSpike, |s| {
            let history = state.volume_history(s.strike)?;
            if history.len() < cfg.volume_min_samples {
                return None;
            }

            let bar = cfg.unusual_volume_multiplier * history.mean()?;
            let volume = s.total_volume();

            if volume >= cfg.volume_threshold && volume > bar {
                Some((
                    vec![
                        Signal::new(bar, volume, 0.7),
                        Signal::new(cfg.volume_threshold, volume, 0.3),
                    ],
                    vec![format!("VOLUME@{}", s.strike)],
                ))
            } else {
                None
            }
        })
    }

    /// OI concentrated within `gamma_band_strikes` intervals of spot.
    fn gamma_squeeze(&self, metrics: &DerivedMetrics) -> Option<Candidate> {
        let cfg = &self.config;

        let interval = metrics.strike_interval.filter(|i| *i > 0.0)?;
        let total = metrics.total_oi();
        if total <= 0.0 {
            return None;
        }

        let band = f64::from(cfg.gamma_band_strikes) * interval;
        let in_band: Vec<&StrikeMetrics> = metrics
            .strikes
            .iter()
            .filter(|s| (s.strike - metrics.ltp).abs() <= band)
            .collect();

        let share = in_band.iter().map(|s| s.total_oi()).sum::<f64>() / total;
        if share <= cfg.gamma_squeeze_threshold {
            return None;
        }

        Some(Candidate {
            pattern: PatternType::GammaSqueeze,
            confidence: self.score(&[Signal::new(cfg.gamma_squeeze_threshold, share, 1.0)]),
            signals: in_band
                .iter()
                .filter(|s| s.total_oi() > 0.0)
                .map(|s| format!("OI_CONCENTRATION@{}", s.strike))
                .collect(),
        })
    }

    /// Max pain moved by more than the deviation threshold, in strike
    /// intervals. Falls back to rolling state when there are no previous
    /// metrics.
    fn max_pain_shift(
        &self,
        metrics: &DerivedMetrics,
        previous: Option<&DerivedMetrics>,
        state: &PatternState,
    ) -> Option<Candidate> {
        let cfg = &self.config;

        let current = metrics.max_pain_strike?;
        let prior = previous
            .and_then(|p| p.max_pain_strike)
            .or(state.last_max_pain())?;
        let interval = metrics.strike_interval.filter(|i| *i > 0.0)?;

        let shift = (current - prior).abs() / interval;
        if shift <= cfg.max_pain_deviation_threshold {
            return None;
        }

        Some(Candidate {
            pattern: PatternType::MaxPainShift,
            confidence: self.score(&[Signal::new(cfg.max_pain_deviation_threshold, shift, 1.0)]),
            signals: BTreeSet::from([
                format!("MAX_PAIN_FROM@{prior}"),
                format!("MAX_PAIN_TO@{current}"),
            ]),
        })
    }

    fn volatility_spike(&self, metrics: &DerivedMetrics) -> Option<Candidate> {
        let cfg = &self.config;

        let change = metrics.spot_change_percent?;
        if change.abs() <= cfg.volatility_spike_threshold {
            return None;
        }

        let tag = if change > 0.0 { "SPOT_MOVE_UP" } else { "SPOT_MOVE_DOWN" };

        Some(Candidate {
            pattern: PatternType::VolatilitySpike,
            confidence: self.score(&[Signal::new(cfg.volatility_spike_threshold, change, 1.0)]),
            signals: BTreeSet::from([tag.to_string()]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use corelib::models::{Strength, Velocity};
    use proptest::prelude::*;

    fn strike(k: f64) -> StrikeMetrics {
        StrikeMetrics {
            strike: k,
            call_oi: 10_000.0,
            put_oi: 10_000.0,
            call_oi_velocity: Velocity::ZERO,
            put_oi_velocity: Velocity::ZERO,
            call_ltp_velocity: Velocity::ZERO,
            put_ltp_velocity: Velocity::ZERO,
            ..Default::default()
        }
    }

    fn delta(absolute: f64) -> Velocity {
        Velocity {
            absolute,
            percent: None,
        }
    }

    /// Eleven strikes 23_500..=24_500 with flat OI, spot at 24_010.
    fn metrics(strikes: Vec<StrikeMetrics>) -> DerivedMetrics {
        let total_call_oi = strikes.iter().map(|s| s.call_oi).sum();
        let total_put_oi = strikes.iter().map(|s| s.put_oi).sum();
        DerivedMetrics {
            instrument: "NIFTY".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 15, 4, 0, 0).unwrap(),
            ltp: 24_010.0,
            spot_change_percent: Some(0.1),
            total_call_oi,
            total_put_oi,
            pcr: Some(1.0),
            max_pain_strike: Some(24_000.0),
            strike_interval: Some(100.0),
            strikes,
            baseline: false,
            stale: false,
        }
    }

    fn flat_chain() -> Vec<StrikeMetrics> {
        (0..11).map(|i| strike(23_500.0 + 100.0 * i as f64)).collect()
    }

    fn with_call_deltas(at: f64, d_oi: f64, d_ltp: f64) -> DerivedMetrics {
        let mut chain = flat_chain();
        for s in chain.iter_mut().filter(|s| s.strike == at) {
            s.call_oi_velocity = delta(d_oi);
            s.call_ltp_velocity = delta(d_ltp);
        }
        metrics(chain)
    }

    fn detector() -> PatternDetector {
        PatternDetector::new(Arc::new(PatternConfig::default()))
    }

    fn types(events: &[PatternEvent]) -> Vec<PatternType> {
        events.iter().map(|e| e.pattern_type).collect()
    }

    #[test]
    fn call_buildup_needs_oi_and_premium() {
        let d = detector();
        let mut state = PatternState::new();

        let events = d.detect(&with_call_deltas(24_000.0, 50_000.0, 8.0), None, &mut state);
        assert_eq!(types(&events), vec![PatternType::CallBuildup]);

        let e = &events[0];
        assert!(e.confidence > 0.6);
        assert!(e.signals.contains("CALL_OI_DELTA@24000"));
        assert!(e.signals.contains("CALL_LTP_DELTA@24000"));

        // Premium up but below threshold.
        let events = d.detect(&with_call_deltas(24_000.0, 50_000.0, 4.0), None, &mut state);
        assert!(events.is_empty());

        // OI below threshold.
        let events = d.detect(&with_call_deltas(24_000.0, 4_000.0, 20.0), None, &mut state);
        assert!(events.is_empty());
    }

    #[test]
    fn put_unwinding_on_falling_oi_and_premium() {
        let mut chain = flat_chain();
        chain[4].put_oi_velocity = delta(-30_000.0);
        chain[4].put_ltp_velocity = delta(-12.0);

        let events = detector().detect(&metrics(chain), None, &mut PatternState::new());

        assert_eq!(types(&events), vec![PatternType::PutUnwinding]);
        assert!(events[0].signals.contains("PUT_OI_DROP@23900"));
    }

    #[test]
    fn put_buildup_on_rising_put_oi_and_premium() {
        let mut chain = flat_chain();
        chain[3].put_oi_velocity = delta(40_000.0);
        chain[3].put_ltp_velocity = delta(9.0);

        let events = detector().detect(&metrics(chain), None, &mut PatternState::new());

        assert_eq!(types(&events), vec![PatternType::PutBuildup]);
        assert!(events[0].signals.contains("PUT_OI_DELTA@23800"));
        assert!(events[0].signals.contains("PUT_LTP_DELTA@23800"));
    }

    #[test]
    fn call_unwinding_on_falling_call_oi_and_premium() {
        let events = detector().detect(
            &with_call_deltas(24_200.0, -25_000.0, -7.0),
            None,
            &mut PatternState::new(),
        );

        assert_eq!(types(&events), vec![PatternType::CallUnwinding]);
        assert!(events[0].signals.contains("CALL_OI_DROP@24200"));
        assert!(events[0].signals.contains("CALL_LTP_DROP@24200"));
    }

    #[test]
    fn one_event_per_type_with_tags_from_every_strike() {
        let mut chain = flat_chain();
        for s in chain.iter_mut().filter(|s| s.strike >= 24_100.0) {
            s.call_oi_velocity = delta(20_000.0);
            s.call_ltp_velocity = delta(10.0);
        }
        chain[8].call_oi_velocity = delta(90_000.0);

        let events = detector().detect(&metrics(chain), None, &mut PatternState::new());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signals.len(), 10);
        assert!(events[0].signals.contains("CALL_OI_DELTA@24300"));
    }

    #[test]
    fn volume_spike_waits_for_history() {
        let d = detector();
        let mut state = PatternState::new();

        let tick = |vol: f64| {
            let mut chain = flat_chain();
            chain[5].call_volume = vol;
            metrics(chain)
        };

        for _ in 0..2 {
            d.detect(&tick(500.0), None, &mut state);
        }
        // Two samples of history, three required.
        assert!(d.detect(&tick(10_000.0), None, &mut state).is_empty());

        // History is now 500, 500, 10_000: average 3_666.
        assert!(d.detect(&tick(10_000.0), None, &mut state).is_empty());

        let events = d.detect(&tick(40_000.0), None, &mut state);
        assert_eq!(types(&events), vec![PatternType::VolumeSpike]);
        assert!(events[0].signals.contains("VOLUME@24000"));
    }

    #[test]
    fn gamma_squeeze_on_concentrated_oi_near_spot() {
        let mut chain = flat_chain();
        for s in chain.iter_mut() {
            if (s.strike - 24_010.0).abs() <= 200.0 {
                s.call_oi = 200_000.0;
            }
        }
        let events = detector().detect(&metrics(chain), None, &mut PatternState::new());

        assert_eq!(types(&events), vec![PatternType::GammaSqueeze]);
        assert!(events[0].signals.contains("OI_CONCENTRATION@23900"));
        assert!(events[0].signals.contains("OI_CONCENTRATION@24200"));
        assert!(!events[0].signals.contains("OI_CONCENTRATION@23800"));
    }

    #[test]
    fn max_pain_shift_uses_rolling_state_without_previous() {
        let d = detector();
        let mut state = PatternState::new();

        d.detect(&metrics(flat_chain()), None, &mut state);
        assert_eq!(state.last_max_pain(), Some(24_000.0));

        let mut moved = metrics(flat_chain());
        moved.max_pain_strike = Some(24_300.0);
        let events = d.detect(&moved, None, &mut state);

        assert_eq!(types(&events), vec![PatternType::MaxPainShift]);
        assert!(events[0].signals.contains("MAX_PAIN_FROM@24000"));
        assert!(events[0].signals.contains("MAX_PAIN_TO@24300"));

        // Exactly two intervals is not beyond the threshold.
        let mut prev = metrics(flat_chain());
        prev.max_pain_strike = Some(24_100.0);
        assert!(d.detect(&moved, Some(&prev), &mut state).is_empty());
    }

    #[test]
    fn volatility_spike_on_large_spot_move() {
        let mut m = metrics(flat_chain());
        m.spot_change_percent = Some(-1.8);

        let events = detector().detect(&m, None, &mut PatternState::new());
        assert_eq!(types(&events), vec![PatternType::VolatilitySpike]);
        assert!(events[0].signals.contains("SPOT_MOVE_DOWN"));
    }

    #[test]
    fn low_confidence_patterns_are_suppressed() {
        struct Fixed(f64);
        impl ConfidenceScorer for Fixed {
            fn score(&self, _: &[Signal]) -> f64 {
                self.0
            }
        }

        let m = with_call_deltas(24_000.0, 50_000.0, 8.0);

        let d = detector().with_scorer(Arc::new(Fixed(0.3)));
        assert!(d.detect(&m, None, &mut PatternState::new()).is_empty());

        let d = detector().with_scorer(Arc::new(Fixed(0.5)));
        let events = d.detect(&m, None, &mut PatternState::new());
        assert_eq!(events[0].strength, Strength::Low);

        // Out-of-range scores are clamped.
        let d = detector().with_scorer(Arc::new(Fixed(7.0)));
        let events = d.detect(&m, None, &mut PatternState::new());
        assert_eq!(events[0].confidence, 1.0);
    }

    #[test]
    fn events_sorted_and_capped() {
        let mut chain = flat_chain();
        chain[5].call_oi_velocity = delta(50_000.0);
        chain[5].call_ltp_velocity = delta(8.0);
        let mut m = metrics(chain);
        m.spot_change_percent = Some(5.0);

        let events = detector().detect(&m, None, &mut PatternState::new());
        assert_eq!(events.len(), 2);
        assert!(events[0].confidence >= events[1].confidence);

        let capped = PatternDetector::new(Arc::new(PatternConfig {
            max_patterns_per_tick: 1,
            ..Default::default()
        }));
        assert_eq!(capped.detect(&m, None, &mut PatternState::new()).len(), 1);
    }

    proptest! {
        #[test]
        fn call_buildup_requires_both_sub_conditions(
            d_oi in -100_000.0f64..100_000.0,
            d_ltp in -50.0f64..50.0,
        ) {
            let cfg = PatternConfig::default();
            prop_assume!(!(d_oi > cfg.oi_change_threshold && d_ltp > cfg.premium_change_threshold));

            let events = detector().detect(&with_call_deltas(24_000.0, d_oi, d_ltp), None, &mut PatternState::new());
            prop_assert!(!types(&events).contains(&PatternType::CallBuildup));
        }
    }
}
