use std::time::Duration;

use async_trait::async_trait;
use corelib::models::OptionChainSnapshot;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{MarketDataProvider, ProviderError};

/// Fetches snapshot JSON from `GET {base_url}/option-chain/{symbol}`.
#[derive(Clone)]
pub struct HttpProvider {
    id: String,
    http: Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            id: id.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(provider = %self.id), level = "debug")]
    async fn fetch_snapshot(&self, symbol: &str) -> Result<OptionChainSnapshot, ProviderError> {
        let url = format!("{}/option-chain/{}", self.base_url, symbol);

        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let body = resp.bytes().await?;
        let snapshot: OptionChainSnapshot = serde_json::from_slice(&body)?;

        debug!(
            strikes = snapshot.strikes().len(),
            ltp = snapshot.ltp(),
            "option chain fetched"
        );

        Ok(snapshot)
    }
}
