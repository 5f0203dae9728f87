use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use corelib::models::OptionChainSnapshot;
use parking_lot::Mutex;

use super::{MarketDataProvider, ProviderError};

/// Serves pre-loaded responses per symbol in FIFO order.
///
/// Backs historical replay (see [`QueueProvider::from_archive`]) and scripted
/// provider behaviour in tests.
pub struct QueueProvider {
    id: String,
    queues: Mutex<HashMap<String, VecDeque<Result<OptionChainSnapshot, ProviderError>>>>,
    calls: AtomicUsize,
}

impl QueueProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queues: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, snapshot: OptionChainSnapshot) {
        let symbol = snapshot.symbol().to_string();
        self.queues
            .lock()
            .entry(symbol)
            .or_default()
            .push_back(Ok(snapshot));
    }

    pub fn push_failure(&self, symbol: &str, err: ProviderError) {
        self.queues
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .push_back(Err(err));
    }

    /// Responses still queued for `symbol`.
    pub fn remaining(&self, symbol: &str) -> usize {
        self.queues.lock().get(symbol).map_or(0, VecDeque::len)
    }

    /// Total number of fetch calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for QueueProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<OptionChainSnapshot, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.queues
            .lock()
            .get_mut(symbol)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ProviderError::Exhausted(symbol.to_string())))
    }
}
