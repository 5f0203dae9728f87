//! One processing lane per watched instrument.
//!
//! A lane owns every piece of rolling state for its instrument (pattern
//! windows, last max pain, alert ARMED/FIRED flags). Commands arrive over a
//! channel and are handled one at a time, so ticks for one instrument never
//! interleave and `Stop` is only seen once the current tick has finished.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{annotate_span, warn_if_slow};
use corelib::models::{AlertRule, DerivedMetrics, Instrument, MarketEvent, StaleData};
use engine::{AlertState, PatternState};
use market::{CacheRead, ClockMode};
use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::pipeline::PipelineContext;

pub enum LaneCommand {
    Tick {
        tick: u64,
        /// Set when the sender waits for the outcome.
        done: Option<oneshot::Sender<TickOutcome>>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Outside trading hours.
    Closed,
    /// Nothing cached yet.
    NoData,
    /// Snapshot already analysed.
    Unchanged,
    Analysed { patterns: usize, alerts: usize },
    Failed,
    /// Lane stopped before the tick ran.
    Stopped,
}

/// Rolling state owned by one lane.
#[derive(Debug, Default)]
pub struct LaneState {
    last_snapshot_ts: Option<DateTime<Utc>>,
    previous_metrics: Option<DerivedMetrics>,
    patterns: PatternState,
    alerts: AlertState,
    /// Rule epochs seen on the last tick.
    rule_epochs: HashMap<String, u64>,
    degraded_reported: bool,
}

pub struct Lane {
    instrument: Instrument,
    ctx: Arc<PipelineContext>,
    state: LaneState,
}

impl Lane {
    pub fn new(instrument: Instrument, ctx: Arc<PipelineContext>) -> Self {
        Self {
            instrument,
            ctx,
            state: LaneState::default(),
        }
    }

    pub async fn run(mut self, mut rx: Receiver<LaneCommand>) {
        info!(component = "lane", event = "startup", market = %self.instrument.market_type);

        while let Some(cmd) = rx.recv().await {
            match cmd {
                LaneCommand::Tick { tick, done } => {
                    annotate_span(tick);

                    let budget = self.ctx.config.update_interval();
                    let outcome = warn_if_slow("lane_tick", budget, self.tick()).await;
                    debug!(tick, ?outcome, "tick processed");

                    if let Some(done) = done {
                        let _ = done.send(outcome);
                    }
                }
                LaneCommand::Stop { ack } => {
                    self.ctx.cache.evict(&self.instrument.symbol);
                    info!(component = "lane", event = "stopped", "lane state released");
                    let _ = ack.send(());
                    return;
                }
            }
        }

        warn!(component = "lane", "command channel closed");
    }

    async fn tick(&mut self) -> TickOutcome {
        let ctx = Arc::clone(&self.ctx);
        let symbol = self.instrument.symbol.clone();

        let gate = ctx.clock.gate(self.instrument.market_type, Utc::now());
        if !gate.allows_analysis() {
            debug!("market closed; tick skipped");
            return TickOutcome::Closed;
        }

        let read = match ctx.clock.mode() {
            ClockMode::Replay => {
                ctx.cache.refresh(&symbol).await;
                ctx.cache.peek(&symbol)
            }
            ClockMode::Live => ctx.cache.get(&symbol),
        };

        let (pair, stale) = match read {
            CacheRead::Fresh(pair) => {
                self.state.degraded_reported = false;
                (pair, false)
            }
            CacheRead::Stale {
                pair,
                age,
                degraded,
            } => {
                if !degraded {
                    self.state.degraded_reported = false;
                } else if !self.state.degraded_reported {
                    self.state.degraded_reported = true;

                    let age_ms = age.as_millis() as u64;
                    warn!(age_ms, "providers down; analysing last good snapshot");
                    ctx.dispatcher.publish(
                        &symbol,
                        MarketEvent::StaleData(StaleData {
                            instrument: symbol.clone(),
                            snapshot_timestamp: pair.current.timestamp(),
                            age_ms,
                        }),
                    );
                }
                (pair, true)
            }
            CacheRead::Miss => {
                debug!("no snapshot cached yet");
                return TickOutcome::NoData;
            }
        };

        if self
            .state
            .last_snapshot_ts
            .is_some_and(|ts| ts >= pair.current.timestamp())
        {
            return TickOutcome::Unchanged;
        }

        let mut metrics = match ctx.metrics.compute(pair.previous.as_deref(), &pair.current) {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "metrics computation failed");
                return TickOutcome::Failed;
            }
        };
        metrics.stale = stale;

        let patterns = ctx.detector.detect(
            &metrics,
            self.state.previous_metrics.as_ref(),
            &mut self.state.patterns,
        );

        let rules = self.rules_for_tick(&symbol).await;
        let firings = ctx
            .evaluator
            .evaluate(&rules, &metrics, &patterns, &mut self.state.alerts);

        let outcome = TickOutcome::Analysed {
            patterns: patterns.len(),
            alerts: firings.len(),
        };

        ctx.dispatcher.publish(&symbol, MarketEvent::Metrics(metrics.clone()));
        for p in patterns {
            ctx.dispatcher.publish(&symbol, MarketEvent::Pattern(p));
        }
        for f in firings {
            ctx.dispatcher.publish(&symbol, MarketEvent::Alert(f));
        }

        self.state.last_snapshot_ts = Some(metrics.timestamp);
        self.state.previous_metrics = Some(metrics);

        outcome
    }

    /// Current rules for this instrument. A rule whose epoch moved since the
    /// last tick (reactivated or replaced) restarts ARMED.
    async fn rules_for_tick(&mut self, symbol: &str) -> Vec<AlertRule> {
        let entries = self.ctx.rules.entries_for(symbol).await;

        self.state
            .rule_epochs
            .retain(|id, _| entries.iter().any(|e| &e.rule.id == id));

        for e in &entries {
            let seen = self.state.rule_epochs.insert(e.rule.id.clone(), e.epoch);
            if seen.is_some_and(|epoch| epoch != e.epoch) {
                self.state.alerts.reset(&e.rule.id);
            }
        }

        entries.into_iter().map(|e| e.rule).collect()
    }
}
