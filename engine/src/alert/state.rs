use std::collections::HashMap;

use corelib::models::{AlertCondition, AlertRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Armed,
    Fired,
}

/// Which side of the target the value was last seen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Above,
    Below,
}

#[derive(Debug, Clone)]
pub(crate) struct RuleState {
    pub phase: Phase,
    pub side: Option<Side>,
    /// Condition and target the state was built for. A rule edited in place
    /// starts over.
    condition: AlertCondition,
    target: f64,
}

impl RuleState {
    fn armed(rule: &AlertRule) -> Self {
        Self {
            phase: Phase::Armed,
            side: None,
            condition: rule.condition,
            target: rule.target_value,
        }
    }

    fn matches(&self, rule: &AlertRule) -> bool {
        self.condition == rule.condition && self.target == rule.target_value
    }
}

/// Last evaluated state per alert rule of one instrument, keyed by rule id.
/// Owned by that instrument's lane.
#[derive(Debug, Default)]
pub struct AlertState {
    rules: HashMap<String, RuleState>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, rule_id: &str) -> Option<Phase> {
        self.rules.get(rule_id).map(|s| s.phase)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Forget `rule_id`; its next evaluation starts ARMED.
    pub fn reset(&mut self, rule_id: &str) {
        self.rules.remove(rule_id);
    }

    pub(crate) fn entry(&mut self, rule: &AlertRule) -> &mut RuleState {
        let state = self
            .rules
            .entry(rule.id.clone())
            .or_insert_with(|| RuleState::armed(rule));

        if !state.matches(rule) {
            *state = RuleState::armed(rule);
        }

        state
    }

    /// Drop state for every rule not in `live`.
    pub(crate) fn retain_ids<'a>(&mut self, live: impl Iterator<Item = &'a str>) {
        let live: std::collections::HashSet<&str> = live.collect();
        self.rules.retain(|id, _| live.contains(id.as_str()));
    }
}
