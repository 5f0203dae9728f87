//! AlertEvaluator
//!
//! Edge-triggered evaluation of user alert rules against one tick of
//! metrics. Per rule: ARMED → FIRED when the condition becomes satisfied,
//! FIRED → ARMED once it stops being satisfied. CROSSES fires on every
//! flip of the value's side relative to the target.

use corelib::models::{
    AlertCondition, AlertFiring, AlertRule, AlertType, DerivedMetrics, PatternEvent,
};
use tracing::{debug, warn};

use super::state::{Phase, Side};
use super::{AlertState, RuleEvaluationError};

#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    /// Relative tolerance for EQUALS, never tighter than the same value
    /// taken as an absolute.
    equals_epsilon: f64,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(1e-6)
    }
}

impl AlertEvaluator {
    pub fn new(equals_epsilon: f64) -> Self {
        Self {
            equals_epsilon: equals_epsilon.abs(),
        }
    }

    /// Evaluate `rules` for the instrument of `metrics`.
    ///
    /// Rules for other instruments are ignored. Inactive rules never fire
    /// and lose their state, so reactivating one starts ARMED.
    /// `patterns` are the events detected on this same tick.
    pub fn evaluate(
        &self,
        rules: &[AlertRule],
        metrics: &DerivedMetrics,
        patterns: &[PatternEvent],
        state: &mut AlertState,
    ) -> Vec<AlertFiring> {
        let live = rules
            .iter()
            .filter(|r| r.active && r.instrument_id == metrics.instrument);

        state.retain_ids(live.clone().map(|r| r.id.as_str()));

        let mut firings = Vec::new();

        for rule in live {
            if let Err(e) = validate(rule) {
                warn!(rule_id = %rule.id, error = %e, "skipping malformed alert rule");
                continue;
            }

            let Some(value) = live_value(rule.alert_type, metrics, patterns) else {
                debug!(rule_id = %rule.id, "value undefined this tick; rule not evaluated");
                continue;
            };

            if self.step(rule, value, state) {
                debug!(rule_id = %rule.id, value, target = rule.target_value, "alert fired");
                firings.push(AlertFiring {
                    rule_id: rule.id.clone(),
                    value,
                    timestamp: metrics.timestamp,
                });
            }
        }

        firings
    }

    /// Advance one rule's state machine. Returns whether it fires.
    fn step(&self, rule: &AlertRule, value: f64, state: &mut AlertState) -> bool {
        let target = rule.target_value;
        let rs = state.entry(rule);

        let satisfied = match rule.condition {
            AlertCondition::Above => value > target,
            AlertCondition::Below => value < target,
            AlertCondition::Equals => {
                let tolerance = (self.equals_epsilon * target.abs()).max(self.equals_epsilon);
                (value - target).abs() <= tolerance
            }
            AlertCondition::Crosses => {
                let side = if value > target {
                    Some(Side::Above)
                } else if value < target {
                    Some(Side::Below)
                } else {
                    None
                };

                let flipped = matches!((rs.side, side), (Some(prev), Some(cur)) if prev != cur);

                if side.is_some() {
                    rs.side = side;
                }
                rs.phase = if flipped { Phase::Fired } else { Phase::Armed };
                return flipped;
            }
        };

        match (rs.phase, satisfied) {
            (Phase::Armed, true) => {
                rs.phase = Phase::Fired;
                true
            }
            (Phase::Fired, false) => {
                rs.phase = Phase::Armed;
                false
            }
            _ => false,
        }
    }
}

fn validate(rule: &AlertRule) -> Result<(), RuleEvaluationError> {
    if rule.id.trim().is_empty() {
        return Err(RuleEvaluationError::MissingId);
    }
    if !rule.target_value.is_finite() {
        return Err(RuleEvaluationError::NonFiniteTarget {
            rule_id: rule.id.clone(),
            target: rule.target_value,
        });
    }
    Ok(())
}

fn live_value(kind: AlertType, metrics: &DerivedMetrics, patterns: &[PatternEvent]) -> Option<f64> {
    match kind {
        AlertType::Price => Some(metrics.ltp),
        AlertType::Oi => Some(metrics.total_oi()),
        AlertType::Pcr => metrics.pcr,
        AlertType::Pattern => Some(
            patterns
                .iter()
                .map(|p| p.confidence)
                .fold(0.0, f64::max),
        ),
    }
}
