pub mod cache;
pub mod failover;
pub mod provider;
pub mod retry;
pub mod session_clock;

pub use cache::{CachePolicy, CacheRead, CachedPair, OutageHandler, RefreshOutcome, SnapshotCache};
pub use provider::{MarketDataProvider, ProviderError};
pub use session_clock::{ClockMode, SessionClock, SessionGate, TradingWindow};
