use std::collections::HashMap;

use corelib::models::StrikeMetrics;

use crate::rolling_window::RollingWindow;

/// Rolling state one instrument carries between ticks: trailing volume per
/// strike and the last max pain strike seen. Owned by that instrument's lane.
#[derive(Debug, Default)]
pub struct PatternState {
    /// Keyed by `f64::to_bits` of the strike.
    volumes: HashMap<u64, RollingWindow<f64>>,
    last_max_pain: Option<f64>,
}

impl PatternState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_max_pain(&self) -> Option<f64> {
        self.last_max_pain
    }

    pub fn tracked_strikes(&self) -> usize {
        self.volumes.len()
    }

    pub(crate) fn volume_history(&self, strike: f64) -> Option<&RollingWindow<f64>> {
        self.volumes.get(&strike.to_bits())
    }

    /// Append this tick's volumes. Strikes no longer listed are dropped.
    pub(crate) fn record_volumes(&mut self, strikes: &[StrikeMetrics], window: usize) {
        self.volumes
            .retain(|key, _| strikes.iter().any(|s| s.strike.to_bits() == *key));

        for s in strikes {
            self.volumes
                .entry(s.strike.to_bits())
                .or_insert_with(|| RollingWindow::new(window))
                .push(s.total_volume());
        }
    }

    pub(crate) fn set_last_max_pain(&mut self, strike: Option<f64>) {
        if strike.is_some() {
            self.last_max_pain = strike;
        }
    }
}
