//! SnapshotCache
//!
//! Holds the latest and previous snapshot per instrument.
//! Responsibilities:
//!   • Serve reads without blocking on providers (fresh / stale / miss)
//!   • Trigger background refresh when an entry is past its TTL
//!   • Walk the provider priority list with retry + backoff (see `failover`)
//!   • Keep serving the last good snapshot when every provider fails, and
//!     report the outage instead of failing the caller
//!   • Coalesce concurrent refreshes of one instrument into a single call

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use corelib::models::{OptionChainSnapshot, ProviderOutage};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::failover::Failover;
use crate::provider::{MarketDataProvider, ProviderError};
use crate::retry::RetryPolicy;

/// Callback invoked once per refresh that exhausted every provider.
pub type OutageHandler = Arc<dyn Fn(ProviderOutage) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    /// Attempts per provider before falling through to the next one.
    pub max_attempts: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            max_attempts: 3,
            retry: RetryPolicy::default(),
            provider_timeout: Duration::from_secs(4),
        }
    }
}

/// Current snapshot and the one it replaced.
#[derive(Debug, Clone)]
pub struct CachedPair {
    pub current: Arc<OptionChainSnapshot>,
    pub previous: Option<Arc<OptionChainSnapshot>>,
}

#[derive(Debug, Clone)]
pub enum CacheRead {
    Fresh(CachedPair),
    /// Past TTL. `degraded` is set when the last refresh exhausted all providers.
    Stale {
        pair: CachedPair,
        age: Duration,
        degraded: bool,
    },
    Miss,
}

impl CacheRead {
    pub fn pair(&self) -> Option<&CachedPair> {
        match self {
            CacheRead::Fresh(pair) | CacheRead::Stale { pair, .. } => Some(pair),
            CacheRead::Miss => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CacheRead::Stale { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { provider: String },
    /// Every provider reported it has nothing further for the instrument.
    /// Not an outage: the entry keeps its state and no handler is called.
    Drained,
    Degraded { last_error: String },
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

struct CacheEntry {
    pair: CachedPair,
    ingested_at: Instant,
    degraded: bool,
}

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Drops the in-flight slot when the refresh future finishes or unwinds.
struct InFlightSlot<'a> {
    in_flight: &'a Mutex<HashMap<String, InFlight>>,
    symbol: &'a str,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(self.symbol);
    }
}

pub struct SnapshotCache {
    /// Providers in priority order.
    providers: Vec<Arc<dyn MarketDataProvider>>,
    policy: CachePolicy,
    entries: RwLock<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    /// Bumped by `evict`; a refresh started under an older generation
    /// does not store its result.
    generations: Mutex<HashMap<String, u64>>,
    on_outage: Option<OutageHandler>,
}

impl SnapshotCache {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>, policy: CachePolicy) -> Self {
        Self {
            providers,
            policy,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            on_outage: None,
        }
    }

    pub fn with_outage_handler(mut self, handler: OutageHandler) -> Self {
        self.on_outage = Some(handler);
        self
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    /// Non-blocking read. A stale entry or a miss schedules a background
    /// refresh and returns immediately.
    pub fn get(self: &Arc<Self>, symbol: &str) -> CacheRead {
        let read = self.peek(symbol);

        if !matches!(read, CacheRead::Fresh(_)) {
            self.spawn_refresh(symbol);
        }

        read
    }

    /// Read without scheduling anything.
    pub fn peek(&self, symbol: &str) -> CacheRead {
        let entries = self.entries.read();

        let Some(entry) = entries.get(symbol) else {
            return CacheRead::Miss;
        };

        let age = entry.ingested_at.elapsed();
        if age > self.policy.ttl {
            CacheRead::Stale {
                pair: entry.pair.clone(),
                age,
                degraded: entry.degraded,
            }
        } else {
            CacheRead::Fresh(entry.pair.clone())
        }
    }

    /// Drop everything held for `symbol`. A refresh already running for it
    /// finishes without storing.
    pub fn evict(&self, symbol: &str) {
        let mut entries = self.entries.write();
        entries.remove(symbol);
        *self.generations.lock().entry(symbol.to_string()).or_default() += 1;
    }

    fn generation(&self, symbol: &str) -> u64 {
        self.generations.lock().get(symbol).copied().unwrap_or(0)
    }

    fn spawn_refresh(self: &Arc<Self>, symbol: &str) {
        if self.in_flight.lock().contains_key(symbol) {
            return;
        }

        let this = Arc::clone(self);
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            this.refresh(&symbol).await;
        });
    }

    /// Refresh `symbol` from providers. Joins the in-flight refresh if one
    /// is already running. Never fails: failure of every provider yields
    /// `Degraded`, providers with nothing further yield `Drained`.
    pub async fn refresh(self: &Arc<Self>, symbol: &str) -> RefreshOutcome {
        let fut = {
            let mut in_flight = self.in_flight.lock();

            match in_flight.get(symbol) {
                Some(existing) => {
                    debug!(instrument = %symbol, "joining in-flight refresh");
                    existing.clone()
                }
                None => {
                    let this = Arc::clone(self);
                    let key = symbol.to_string();
                    let fut = async move {
                        let _slot = InFlightSlot {
                            in_flight: &this.in_flight,
                            symbol: &key,
                        };
                        this.run_refresh(&key).await
                    }
                    .boxed()
                    .shared();

                    in_flight.insert(symbol.to_string(), fut.clone());
                    fut
                }
            }
        };

        fut.await
    }

    #[instrument(skip(self), fields(instrument = %symbol))]
    async fn run_refresh(&self, symbol: &str) -> RefreshOutcome {
        let generation = self.generation(symbol);
        let mut failover = Failover::new(self.providers.len(), self.policy.max_attempts);
        let mut last_error = String::from("no providers configured");
        let mut failed = self.providers.is_empty();

        while let Some((idx, attempt)) = failover.target() {
            let provider = &self.providers[idx];

            if attempt > 1 {
                sleep(self.policy.retry.delay(attempt - 2)).await;
            }

            let call = AssertUnwindSafe(provider.fetch_snapshot(symbol)).catch_unwind();

            let result = match timeout(self.policy.provider_timeout, call).await {
                Ok(Ok(Ok(snapshot))) if snapshot.symbol() == symbol => Ok(snapshot),
                Ok(Ok(Ok(snapshot))) => Err(ProviderError::InvalidPayload(format!(
                    "requested {symbol}, received {}",
                    snapshot.symbol()
                ))),
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(_)) => Err(ProviderError::Unavailable(format!(
                    "{} panicked while fetching",
                    provider.id()
                ))),
                Err(_) => Err(ProviderError::Timeout(self.policy.provider_timeout)),
            };

            match result {
                Ok(snapshot) => {
                    if self.store(snapshot, generation) {
                        debug!(provider = %provider.id(), attempt, "snapshot refreshed");
                    } else {
                        debug!(provider = %provider.id(), "instrument evicted during refresh; snapshot dropped");
                    }
                    return RefreshOutcome::Refreshed {
                        provider: provider.id().to_string(),
                    };
                }
                Err(ProviderError::Exhausted(_)) => {
                    debug!(provider = %provider.id(), "provider has no further snapshots");
                    failover.on_drained();
                }
                Err(e) => {
                    warn!(
                        provider = %provider.id(),
                        attempt,
                        error = %e,
                        "provider fetch failed"
                    );
                    last_error = e.to_string();
                    failed = true;
                    failover.on_failure();
                }
            }
        }

        if !failed {
            debug!("all providers drained");
            return RefreshOutcome::Drained;
        }

        if self.generation(symbol) != generation {
            debug!(error = %last_error, "instrument evicted during refresh; outage not reported");
            return RefreshOutcome::Degraded { last_error };
        }

        self.mark_degraded(symbol);

        warn!(error = %last_error, "all providers failed; serving last good snapshot");

        if let Some(handler) = &self.on_outage {
            handler(ProviderOutage {
                instrument: symbol.to_string(),
                providers: self.provider_ids(),
                last_error: last_error.clone(),
                timestamp: Utc::now(),
            });
        }

        RefreshOutcome::Degraded { last_error }
    }

    /// Rotate current → previous. A snapshot not newer than the current one
    /// only confirms freshness. Returns `false` when `symbol` was evicted
    /// after `generation` was read.
    fn store(&self, snapshot: OptionChainSnapshot, generation: u64) -> bool {
        let mut entries = self.entries.write();

        if self.generation(snapshot.symbol()) != generation {
            return false;
        }

        let now = Instant::now();

        match entries.get_mut(snapshot.symbol()) {
            Some(entry) if snapshot.timestamp() <= entry.pair.current.timestamp() => {
                entry.ingested_at = now;
                entry.degraded = false;
                debug!(
                    instrument = %snapshot.symbol(),
                    ts = %snapshot.timestamp(),
                    "provider returned no newer snapshot"
                );
            }
            Some(entry) => {
                let previous = Arc::clone(&entry.pair.current);
                entry.pair = CachedPair {
                    current: Arc::new(snapshot),
                    previous: Some(previous),
                };
                entry.ingested_at = now;
                entry.degraded = false;
            }
            None => {
                info!(instrument = %snapshot.symbol(), "first snapshot cached");
                entries.insert(
                    snapshot.symbol().to_string(),
                    CacheEntry {
                        pair: CachedPair {
                            current: Arc::new(snapshot),
                            previous: None,
                        },
                        ingested_at: now,
                        degraded: false,
                    },
                );
            }
        }

        true
    }

    fn mark_degraded(&self, symbol: &str) {
        if let Some(entry) = self.entries.write().get_mut(symbol) {
            entry.degraded = true;
        }
    }
}
