use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use corelib::models::MarketType;
use engine::{AlertEvaluator, DeliveryPolicy, PatternConfig};
use market::retry::RetryPolicy;
use market::{CachePolicy, ClockMode, SessionClock, TradingWindow};

use crate::error::ConfigError;

/// Largest UTC offset accepted, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    // =========================
    // Driver
    // =========================
    /// Period of the driver tick, in milliseconds.
    ///
    /// Every watched instrument is offered one tick per period. A lane that
    /// is still busy with the previous tick skips the new one.
    pub update_interval_ms: u64,

    /// Analyse archived data instead of live data.
    ///
    /// Trading hours are bypassed and every tick awaits a cache refresh so
    /// archived snapshots are consumed in order.
    pub replay: bool,

    // =========================
    // Snapshot cache / providers
    // =========================
    /// Attempts against one provider before falling through to the next.
    pub max_retry_attempts: usize,

    /// First retry delay; doubles per retry up to `retry_max_delay_ms`.
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Upper bound on one provider call.
    pub provider_timeout_ms: u64,

    /// Age past which a cached snapshot is served as stale and refreshed.
    pub cache_ttl_ms: u64,

    /// Provider ids, highest priority first. Empty means registration order.
    /// Registered providers not listed here are tried after the listed ones.
    pub provider_priority: Vec<String>,

    // =========================
    // Trading session
    // =========================
    /// Offset of the exchange time zone from UTC. Default is IST.
    pub utc_offset_minutes: i32,
    pub equity_hours: TradingWindow,
    pub commodity_hours: TradingWindow,
    pub currency_hours: TradingWindow,

    // =========================
    // Analysis
    // =========================
    pub patterns: PatternConfig,

    /// Relative tolerance for EQUALS alert rules.
    pub alert_equals_epsilon: f64,

    // =========================
    // Delivery
    // =========================
    /// Attempts per event per subscriber.
    pub delivery_attempts: usize,
    pub delivery_queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 3_000,
            replay: false,

            max_retry_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 2_000,
            provider_timeout_ms: 4_000,
            cache_ttl_ms: 5_000,
            provider_priority: Vec::new(),

            utc_offset_minutes: 330,
            equity_hours: TradingWindow::from_hm(9, 15, 15, 30),
            commodity_hours: TradingWindow::from_hm(9, 0, 23, 30),
            currency_hours: TradingWindow::from_hm(9, 0, 17, 0),

            patterns: PatternConfig::default(),
            alert_equals_epsilon: 1e-6,

            delivery_attempts: 3,
            delivery_queue_capacity: 1_024,
        }
    }
}

impl AppConfig {
    /// Read `CHAINPULSE_*` variables over the defaults and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an arbitrary key source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let p = d.patterns.clone();
        let env = Lookup(get);

        let provider_priority = env
            .raw("CHAINPULSE_PROVIDER_PRIORITY")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let cfg = Self {
            update_interval_ms: env.parse("CHAINPULSE_UPDATE_INTERVAL_MS", d.update_interval_ms)?,
            replay: env.parse("CHAINPULSE_REPLAY", d.replay)?,

            max_retry_attempts: env.parse("CHAINPULSE_MAX_RETRY_ATTEMPTS", d.max_retry_attempts)?,
            retry_base_delay_ms: env.parse("CHAINPULSE_RETRY_BASE_DELAY_MS", d.retry_base_delay_ms)?,
            retry_max_delay_ms: env.parse("CHAINPULSE_RETRY_MAX_DELAY_MS", d.retry_max_delay_ms)?,
            provider_timeout_ms: env.parse("CHAINPULSE_PROVIDER_TIMEOUT_MS", d.provider_timeout_ms)?,
            cache_ttl_ms: env.parse("CHAINPULSE_CACHE_TTL_MS", d.cache_ttl_ms)?,
            provider_priority,

            utc_offset_minutes: env.parse("CHAINPULSE_UTC_OFFSET_MINUTES", d.utc_offset_minutes)?,
            equity_hours: env.parse("CHAINPULSE_HOURS_EQUITY", d.equity_hours)?,
            commodity_hours: env.parse("CHAINPULSE_HOURS_COMMODITY", d.commodity_hours)?,
            currency_hours: env.parse("CHAINPULSE_HOURS_CURRENCY", d.currency_hours)?,

            patterns: PatternConfig {
                oi_change_threshold: env.parse("CHAINPULSE_OI_CHANGE_THRESHOLD", p.oi_change_threshold)?,
                premium_change_threshold: env
                    .parse("CHAINPULSE_PREMIUM_CHANGE_THRESHOLD", p.premium_change_threshold)?,
                volume_threshold: env.parse("CHAINPULSE_VOLUME_THRESHOLD", p.volume_threshold)?,
                volatility_spike_threshold: env
                    .parse("CHAINPULSE_VOLATILITY_SPIKE_THRESHOLD", p.volatility_spike_threshold)?,
                unusual_volume_multiplier: env
                    .parse("CHAINPULSE_UNUSUAL_VOLUME_MULTIPLIER", p.unusual_volume_multiplier)?,
                gamma_squeeze_threshold: env
                    .parse("CHAINPULSE_GAMMA_SQUEEZE_THRESHOLD", p.gamma_squeeze_threshold)?,
                gamma_band_strikes: env.parse("CHAINPULSE_GAMMA_BAND_STRIKES", p.gamma_band_strikes)?,
                max_pain_deviation_threshold: env
                    .parse("CHAINPULSE_MAX_PAIN_DEVIATION_THRESHOLD", p.max_pain_deviation_threshold)?,
                confidence_high: env.parse("CHAINPULSE_CONFIDENCE_HIGH", p.confidence_high)?,
                confidence_medium: env.parse("CHAINPULSE_CONFIDENCE_MEDIUM", p.confidence_medium)?,
                confidence_low: env.parse("CHAINPULSE_CONFIDENCE_LOW", p.confidence_low)?,
                max_patterns_per_tick: env
                    .parse("CHAINPULSE_MAX_PATTERNS_PER_TICK", p.max_patterns_per_tick)?,
                volume_window: env.parse("CHAINPULSE_VOLUME_WINDOW", p.volume_window)?,
                volume_min_samples: env.parse("CHAINPULSE_VOLUME_MIN_SAMPLES", p.volume_min_samples)?,
            },
            alert_equals_epsilon: env.parse("CHAINPULSE_ALERT_EQUALS_EPSILON", d.alert_equals_epsilon)?,

            delivery_attempts: env.parse("CHAINPULSE_DELIVERY_ATTEMPTS", d.delivery_attempts)?,
            delivery_queue_capacity: env.parse(
                "CHAINPULSE_DELIVERY_QUEUE_CAPACITY",
                d.delivery_queue_capacity,
            )?,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("update_interval_ms", self.update_interval_ms),
            ("max_retry_attempts", self.max_retry_attempts as u64),
            ("retry_base_delay_ms", self.retry_base_delay_ms),
            ("retry_max_delay_ms", self.retry_max_delay_ms),
            ("provider_timeout_ms", self.provider_timeout_ms),
            ("cache_ttl_ms", self.cache_ttl_ms),
            ("delivery_attempts", self.delivery_attempts as u64),
            ("delivery_queue_capacity", self.delivery_queue_capacity as u64),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Invalid {
                key: "CHAINPULSE_RETRY_BASE_DELAY_MS",
                value: self.retry_base_delay_ms.to_string(),
                reason: format!("exceeds retry max delay of {}ms", self.retry_max_delay_ms),
            });
        }

        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::UtcOffset(self.utc_offset_minutes));
        }

        if !(self.alert_equals_epsilon.is_finite() && self.alert_equals_epsilon >= 0.0) {
            return Err(ConfigError::Epsilon(self.alert_equals_epsilon));
        }

        self.patterns.validate()?;

        let mut seen = std::collections::HashSet::new();
        for id in &self.provider_priority {
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateProvider(id.clone()));
            }
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn clock_mode(&self) -> ClockMode {
        if self.replay { ClockMode::Replay } else { ClockMode::Live }
    }

    pub fn session_clock(&self) -> Result<SessionClock, ConfigError> {
        let zone = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::UtcOffset(self.utc_offset_minutes))?;

        Ok(SessionClock::new(zone, self.clock_mode())
            .with_window(MarketType::Equity, self.equity_hours)
            .with_window(MarketType::Commodity, self.commodity_hours)
            .with_window(MarketType::Currency, self.currency_hours))
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_millis(self.cache_ttl_ms),
            max_attempts: self.max_retry_attempts,
            retry: RetryPolicy::new(self.retry_base_delay_ms, self.retry_max_delay_ms, 0.2),
            provider_timeout: Duration::from_millis(self.provider_timeout_ms),
        }
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            attempts: self.delivery_attempts,
            queue_capacity: self.delivery_queue_capacity,
            ..DeliveryPolicy::default()
        }
    }

    pub fn alert_evaluator(&self) -> AlertEvaluator {
        AlertEvaluator::new(self.alert_equals_epsilon)
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => {
                let parsed = value.trim().parse::<T>();
                parsed.map_err(|e| ConfigError::Invalid {
                    key,
                    reason: e.to_string(),
                    value,
                })
            }
        }
    }
}
