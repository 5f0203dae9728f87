//! MetricsEngine
//!
//! Turns a (previous, current) snapshot pair into `DerivedMetrics`:
//! PCR, max pain, strike interval, spot change and per-strike velocities.
//! The first snapshot of an instrument is computed against a null baseline
//! (every velocity zero).

use corelib::models::{DerivedMetrics, OptionChainSnapshot, StrikeMetrics, StrikeRow, Velocity};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("previous snapshot is for {previous}, current is for {current}")]
    InstrumentMismatch { previous: String, current: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(
        &self,
        previous: Option<&OptionChainSnapshot>,
        current: &OptionChainSnapshot,
    ) -> Result<DerivedMetrics, MetricsError> {
        if let Some(prev) = previous {
            if prev.symbol() != current.symbol() {
                return Err(MetricsError::InstrumentMismatch {
                    previous: prev.symbol().to_string(),
                    current: current.symbol().to_string(),
                });
            }
        }

        let rows = current.strikes();

        let total_call_oi: f64 = rows.iter().map(|r| r.call_oi).sum();
        let total_put_oi: f64 = rows.iter().map(|r| r.put_oi).sum();

        let strikes = rows
            .iter()
            .map(|row| strike_metrics(row, previous.and_then(|p| p.row(row.strike))))
            .collect();

        let spot_change_percent = previous.and_then(|p| Velocity::between(p.ltp(), current.ltp()).percent);

        Ok(DerivedMetrics {
            instrument: current.symbol().to_string(),
            timestamp: current.timestamp(),
            ltp: current.ltp(),
            spot_change_percent,
            total_call_oi,
            total_put_oi,
            pcr: pcr(total_put_oi, total_call_oi),
            max_pain_strike: max_pain(rows),
            strike_interval: strike_interval(rows),
            strikes,
            baseline: previous.is_none(),
            stale: false,
        })
    }
}

/// Put/call OI ratio. `None` when there is no call OI.
pub fn pcr(total_put_oi: f64, total_call_oi: f64) -> Option<f64> {
    if total_call_oi == 0.0 {
        return None;
    }
    let ratio = total_put_oi / total_call_oi;
    ratio.is_finite().then_some(ratio)
}

/// Strike at which option writers lose the least if the underlying settles
/// there. Ties go to the lower strike. `None` for an empty chain.
pub fn max_pain(rows: &[StrikeRow]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;

    for candidate in rows {
        let settle = candidate.strike;
        let loss = writer_loss(rows, settle);

        match best {
            Some((_, best_loss)) if loss >= best_loss => {}
            _ => best = Some((settle, loss)),
        }
    }

    best.map(|(strike, _)| strike)
}

fn writer_loss(rows: &[StrikeRow], settle: f64) -> f64 {
    rows.iter()
        .map(|r| {
            if r.strike < settle {
                (settle - r.strike) * r.call_oi
            } else if r.strike > settle {
                (r.strike - settle) * r.put_oi
            } else {
                0.0
            }
        })
        .sum()
}

/// Smallest gap between consecutive strikes.
pub fn strike_interval(rows: &[StrikeRow]) -> Option<f64> {
    rows.windows(2)
        .map(|w| w[1].strike - w[0].strike)
        .min_by(f64::total_cmp)
}

fn strike_metrics(row: &StrikeRow, prev: Option<&StrikeRow>) -> StrikeMetrics {
    let velocity = |f: fn(&StrikeRow) -> f64| match prev {
        Some(p) => Velocity::between(f(p), f(row)),
        None => Velocity::ZERO,
    };

    StrikeMetrics {
        strike: row.strike,
        call_oi: row.call_oi,
        put_oi: row.put_oi,
        call_ltp: row.call_ltp,
        put_ltp: row.put_ltp,
        call_volume: row.call_volume,
        put_volume: row.put_volume,
        call_oi_velocity: velocity(|r| r.call_oi),
        put_oi_velocity: velocity(|r| r.put_oi),
        call_ltp_velocity: velocity(|r| r.call_ltp),
        put_ltp_velocity: velocity(|r| r.put_ltp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use corelib::models::{Instrument, MarketType};
    use proptest::prelude::*;

    fn row(strike: f64, call_oi: f64, put_oi: f64) -> StrikeRow {
        StrikeRow {
            strike,
            call_oi,
            put_oi,
            ..Default::default()
        }
    }

    fn snapshot(symbol: &str, ltp: f64, rows: Vec<StrikeRow>) -> OptionChainSnapshot {
        OptionChainSnapshot::new(
            Instrument::new(symbol, MarketType::Equity, NaiveDate::from_ymd_opt(2026, 10, 29).unwrap()),
            Utc.with_ymd_and_hms(2026, 10, 15, 4, 0, 0).unwrap(),
            ltp,
            0.0,
            0.0,
            0.0,
            rows,
        )
        .unwrap()
    }

    #[test]
    fn baseline_has_zero_velocities() {
        let cur = snapshot("NIFTY", 24_000.0, vec![row(24_000.0, 100.0, 75.0)]);
        let m = MetricsEngine.compute(None, &cur).unwrap();

        assert!(m.baseline);
        assert_eq!(m.spot_change_percent, None);
        assert_eq!(m.strikes[0].call_oi_velocity, Velocity::ZERO);
        assert_eq!(m.strikes[0].put_ltp_velocity, Velocity::ZERO);
        assert_eq!(m.pcr, Some(0.75));
    }

    #[test]
    fn velocities_follow_previous_snapshot() {
        let mut prev_row = row(24_000.0, 100_000.0, 50_000.0);
        prev_row.call_ltp = 120.0;
        let mut cur_row = row(24_000.0, 150_000.0, 50_000.0);
        cur_row.call_ltp = 128.0;

        let prev = snapshot("NIFTY", 24_000.0, vec![prev_row]);
        let cur = snapshot("NIFTY", 24_240.0, vec![cur_row, row(24_100.0, 10.0, 10.0)]);

        let m = MetricsEngine.compute(Some(&prev), &cur).unwrap();
        let s = &m.strikes[0];

        assert!(!m.baseline);
        assert_eq!(s.call_oi_velocity.absolute, 50_000.0);
        assert_eq!(s.call_oi_velocity.percent, Some(50.0));
        assert_eq!(s.call_ltp_velocity.absolute, 8.0);
        assert!((m.spot_change_percent.unwrap() - 1.0).abs() < 1e-9);
        // New strike: no history, zero velocity.
        assert_eq!(m.strikes[1].call_oi_velocity, Velocity::ZERO);
        assert_eq!(m.strike_interval, Some(100.0));
    }

    #[test]
    fn pcr_is_undefined_without_call_oi() {
        let cur = snapshot("NIFTY", 24_000.0, vec![row(24_000.0, 0.0, 500.0)]);
        let m = MetricsEngine.compute(None, &cur).unwrap();
        assert_eq!(m.pcr, None);
    }

    #[test]
    fn rejects_pair_from_different_instruments() {
        let prev = snapshot("BANKNIFTY", 51_000.0, vec![]);
        let cur = snapshot("NIFTY", 24_000.0, vec![]);

        let err = MetricsEngine.compute(Some(&prev), &cur).unwrap_err();
        assert_eq!(
            err,
            MetricsError::InstrumentMismatch {
                previous: "BANKNIFTY".into(),
                current: "NIFTY".into()
            }
        );
    }

    #[test]
    fn max_pain_minimises_writer_loss() {
        // Settle at 100: puts above lose (110-100)*10 + (120-100)*50 = 1100
        // Settle at 110: calls below lose 10*20, puts above lose 10*50 = 700
        // Settle at 120: calls below lose 20*20 + 10*30 = 700
        let rows = vec![row(100.0, 20.0, 0.0), row(110.0, 30.0, 10.0), row(120.0, 0.0, 50.0)];
        assert_eq!(max_pain(&rows), Some(110.0));
    }

    #[test]
    fn max_pain_ties_prefer_lower_strike() {
        let rows = vec![row(100.0, 0.0, 0.0), row(110.0, 0.0, 0.0)];
        assert_eq!(max_pain(&rows), Some(100.0));
        assert_eq!(max_pain(&[]), None);
    }

    fn chain() -> impl Strategy<Value = Vec<StrikeRow>> {
        prop::collection::vec((0.0f64..1e6, 0.0f64..1e6), 1..30).prop_map(|ois| {
            ois.into_iter()
                .enumerate()
                .map(|(i, (c, p))| row(20_000.0 + 50.0 * i as f64, c.floor(), p.floor()))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn pcr_matches_ratio_of_totals(rows in chain()) {
            let cur = snapshot("NIFTY", 24_000.0, rows.clone());
            let m = MetricsEngine.compute(None, &cur).unwrap();

            let calls: f64 = rows.iter().map(|r| r.call_oi).sum();
            let puts: f64 = rows.iter().map(|r| r.put_oi).sum();

            match m.pcr {
                None => prop_assert_eq!(calls, 0.0),
                Some(v) => {
                    prop_assert!(v.is_finite());
                    prop_assert!((v - puts / calls).abs() <= 1e-12 * v.abs().max(1.0));
                }
            }
        }

        #[test]
        fn max_pain_is_idempotent(rows in chain()) {
            let cur = snapshot("NIFTY", 24_000.0, rows);
            let a = MetricsEngine.compute(None, &cur).unwrap().max_pain_strike;
            let b = MetricsEngine.compute(None, &cur).unwrap().max_pain_strike;
            prop_assert_eq!(a, b);
            prop_assert!(a.is_some());
        }
    }
}
