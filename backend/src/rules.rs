use std::collections::HashMap;
use std::sync::Arc;

use corelib::models::AlertRule;
use tokio::sync::RwLock;

/// A rule as seen by a lane. `epoch` changes whenever the rule is
/// (re)activated or replaced, telling the lane to reset its alert state.
#[derive(Debug, Clone, PartialEq)]
pub struct BookEntry {
    pub rule: AlertRule,
    pub epoch: u64,
}

#[derive(Default)]
struct Book {
    rules: HashMap<String, BookEntry>,
    next_epoch: u64,
}

impl Book {
    fn bump(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }
}

/// In-process handle to the alert rules managed by the surrounding
/// application. Lanes only read it.
#[derive(Clone, Default)]
pub struct RuleBook {
    inner: Arc<RwLock<Book>>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule by id.
    pub async fn upsert(&self, rule: AlertRule) {
        let mut g = self.inner.write().await;
        let epoch = g.bump();
        g.rules.insert(rule.id.clone(), BookEntry { rule, epoch });
    }

    /// Replace every rule.
    pub async fn replace_all(&self, rules: impl IntoIterator<Item = AlertRule>) {
        let mut g = self.inner.write().await;
        g.rules.clear();
        for rule in rules {
            let epoch = g.bump();
            g.rules.insert(rule.id.clone(), BookEntry { rule, epoch });
        }
    }

    pub async fn remove(&self, rule_id: &str) -> Option<AlertRule> {
        self.inner.write().await.rules.remove(rule_id).map(|e| e.rule)
    }

    /// Returns `false` if the rule does not exist.
    pub async fn set_active(&self, rule_id: &str, active: bool) -> bool {
        let mut g = self.inner.write().await;

        let Some(was_active) = g.rules.get(rule_id).map(|e| e.rule.active) else {
            return false;
        };

        let epoch = if active && !was_active { Some(g.bump()) } else { None };

        if let Some(entry) = g.rules.get_mut(rule_id) {
            entry.rule.active = active;
            if let Some(epoch) = epoch {
                entry.epoch = epoch;
            }
        }
        true
    }

    /// Rules targeting `instrument`, active or not.
    pub async fn entries_for(&self, instrument: &str) -> Vec<BookEntry> {
        self.inner
            .read()
            .await
            .rules
            .values()
            .filter(|e| e.rule.instrument_id == instrument)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rules.len()
    }
}
