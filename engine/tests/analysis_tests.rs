use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use corelib::models::{
    AlertCondition, AlertRule, AlertType, Channel, Instrument, MarketEvent, MarketType,
    OptionChainSnapshot, PatternType, StrikeRow,
};
use engine::{
    AlertEvaluator, AlertState, ChannelSubscriber, DeliveryPolicy, Dispatcher, MetricsEngine,
    PatternConfig, PatternDetector, PatternState,
};

fn nifty(minute: u32, ltp: f64, rows: Vec<StrikeRow>) -> OptionChainSnapshot {
    OptionChainSnapshot::new(
        Instrument::new(
            "NIFTY",
            MarketType::Equity,
            NaiveDate::from_ymd_opt(2026, 10, 29).unwrap(),
        ),
        Utc.with_ymd_and_hms(2026, 10, 15, 4, minute, 0).unwrap(),
        ltp,
        0.0,
        0.0,
        0.0,
        rows,
    )
    .unwrap()
}

/// 23_500..=24_500 step 100. Call OI 100k, put OI 75k per strike (PCR 0.75).
fn base_rows() -> Vec<StrikeRow> {
    (0..11)
        .map(|i| StrikeRow {
            strike: 23_500.0 + 100.0 * i as f64,
            call_oi: 100_000.0,
            call_ltp: 120.0,
            call_volume: 2_000.0,
            put_oi: 75_000.0,
            put_ltp: 95.0,
            put_volume: 1_500.0,
            ..Default::default()
        })
        .collect()
}

#[test]
fn call_buildup_at_24000_yields_exactly_one_event() {
    let config = Arc::new(PatternConfig::default());
    let detector = PatternDetector::new(config.clone());
    let metrics = MetricsEngine::new();
    let mut state = PatternState::new();

    let previous = nifty(0, 24_010.0, base_rows());

    let mut rows = base_rows();
    let at = rows.iter_mut().find(|r| r.strike == 24_000.0).unwrap();
    at.call_oi += 50_000.0;
    at.call_ltp += 8.0;
    let current = nifty(1, 24_015.0, rows);

    let prev_metrics = metrics.compute(None, &previous).unwrap();
    assert_eq!(prev_metrics.pcr, Some(0.75));
    detector.detect(&prev_metrics, None, &mut state);

    let cur_metrics = metrics.compute(Some(&previous), &current).unwrap();
    let events = detector.detect(&cur_metrics, Some(&prev_metrics), &mut state);

    let buildups: Vec<_> = events
        .iter()
        .filter(|e| e.pattern_type == PatternType::CallBuildup)
        .collect();

    assert_eq!(buildups.len(), 1);
    assert!(buildups[0].confidence > config.confidence_medium);
    assert!(buildups[0].signals.contains("CALL_OI_DELTA@24000"));
    assert_eq!(buildups[0].instrument, "NIFTY");
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn one_tick_flows_through_to_subscribers() {
    let metrics = MetricsEngine::new();
    let detector = PatternDetector::new(Arc::new(PatternConfig::default()));
    let evaluator = AlertEvaluator::default();
    let dispatcher = Dispatcher::new(DeliveryPolicy::default());

    let (sink, mut rx) = ChannelSubscriber::new("sink");
    dispatcher.register(Arc::new(sink));

    let rules = vec![AlertRule {
        id: "pattern-hot".into(),
        user_id: "u-7".into(),
        instrument_id: "NIFTY".into(),
        alert_type: AlertType::Pattern,
        condition: AlertCondition::Above,
        target_value: 0.7,
        active: true,
        channels: BTreeSet::from([Channel::Push, Channel::InApp]),
    }];

    let mut pattern_state = PatternState::new();
    let mut alert_state = AlertState::new();

    let previous = nifty(0, 24_010.0, base_rows());
    let mut rows = base_rows();
    rows[5].call_oi += 50_000.0;
    rows[5].call_ltp += 8.0;
    let current = nifty(1, 24_015.0, rows);

    let m = metrics.compute(Some(&previous), &current).unwrap();
    let patterns = detector.detect(&m, None, &mut pattern_state);
    let firings = evaluator.evaluate(&rules, &m, &patterns, &mut alert_state);

    dispatcher.publish("NIFTY", MarketEvent::Metrics(m));
    for p in patterns {
        dispatcher.publish("NIFTY", MarketEvent::Pattern(p));
    }
    for f in firings {
        dispatcher.publish("NIFTY", MarketEvent::Alert(f));
    }
    dispatcher.shutdown().await;

    let mut kinds = Vec::new();
    while let Some(env) = rx.recv().await {
        kinds.push(env.event.kind());
    }

    assert_eq!(kinds, vec!["METRICS", "PATTERN", "ALERT"]);
}
