pub mod archive;
pub mod http;
pub mod queue;

pub use http::HttpProvider;
pub use queue::QueueProvider;

use std::time::Duration;

use async_trait::async_trait;
use corelib::models::OptionChainSnapshot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid snapshot payload: {0}")]
    InvalidPayload(String),

    #[error("no more snapshots for {0}")]
    Exhausted(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of option chain snapshots. Only the snapshot cache calls this.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + 'static {
    /// Stable identifier used in the priority order.
    fn id(&self) -> &str;

    async fn fetch_snapshot(&self, symbol: &str) -> Result<OptionChainSnapshot, ProviderError>;
}
