//! Wires the analysis components from one `AppConfig`.

use std::collections::HashSet;
use std::sync::Arc;

use corelib::models::{MarketEvent, ProviderOutage};
use engine::{AlertEvaluator, ConfidenceScorer, Dispatcher, MetricsEngine, PatternDetector};
use market::{MarketDataProvider, OutageHandler, SessionClock, SnapshotCache};
use tracing::info;

use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::rules::RuleBook;

/// Everything a lane needs. Immutable after bootstrap and shared by `Arc`.
pub struct PipelineContext {
    pub config: Arc<AppConfig>,
    pub clock: SessionClock,
    pub cache: Arc<SnapshotCache>,
    pub metrics: MetricsEngine,
    pub detector: PatternDetector,
    pub evaluator: AlertEvaluator,
    pub dispatcher: Arc<Dispatcher>,
    pub rules: RuleBook,
}

impl PipelineContext {
    /// Validate `config`, order `providers` by the configured priority and
    /// route provider outages to `dispatcher`.
    pub fn bootstrap(
        config: AppConfig,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        dispatcher: Arc<Dispatcher>,
        rules: RuleBook,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let providers = order_providers(&config.provider_priority, providers)?;
        let clock = config.session_clock()?;

        let outage_sink = Arc::clone(&dispatcher);
        let on_outage: OutageHandler = Arc::new(move |outage: ProviderOutage| {
            let instrument = outage.instrument.clone();
            outage_sink.publish(&instrument, MarketEvent::ProviderOutage(outage));
        });

        let cache = SnapshotCache::new(providers, config.cache_policy()).with_outage_handler(on_outage);

        info!(
            providers = ?cache.provider_ids(),
            mode = ?clock.mode(),
            interval_ms = config.update_interval_ms,
            "pipeline ready"
        );

        let config = Arc::new(config);

        Ok(Self {
            clock,
            cache: Arc::new(cache),
            metrics: MetricsEngine::new(),
            detector: PatternDetector::new(Arc::new(config.patterns.clone())),
            evaluator: config.alert_evaluator(),
            dispatcher,
            rules,
            config,
        })
    }

    /// Replace the default confidence scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.detector = PatternDetector::new(Arc::new(self.config.patterns.clone())).with_scorer(scorer);
        self
    }
}

/// Listed ids first, in the given order; unlisted providers follow in
/// registration order.
pub fn order_providers(
    priority: &[String],
    providers: Vec<Arc<dyn MarketDataProvider>>,
) -> Result<Vec<Arc<dyn MarketDataProvider>>, ConfigError> {
    if providers.is_empty() {
        return Err(ConfigError::NoProviders);
    }

    let mut ids = HashSet::new();
    for p in &providers {
        if !ids.insert(p.id().to_string()) {
            return Err(ConfigError::DuplicateProvider(p.id().to_string()));
        }
    }

    let mut remaining: Vec<Option<Arc<dyn MarketDataProvider>>> =
        providers.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    for id in priority {
        let slot = remaining
            .iter_mut()
            .find(|p| p.as_ref().is_some_and(|p| p.id() == id.as_str()))
            .ok_or_else(|| ConfigError::UnknownProvider(id.clone()))?;

        // Duplicates in `priority` find an emptied slot and land here.
        let provider = slot
            .take()
            .ok_or_else(|| ConfigError::DuplicateProvider(id.clone()))?;
        ordered.push(provider);
    }

    ordered.extend(remaining.into_iter().flatten());
    Ok(ordered)
}
