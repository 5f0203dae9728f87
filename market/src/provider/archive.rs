//! JSON-lines archive loader for historical replay.
//!
//! Layout: one `<SYMBOL>.jsonl` file per instrument, one snapshot per line.

use std::fs;
use std::path::Path;

use corelib::models::OptionChainSnapshot;
use tracing::info;

use super::{ProviderError, QueueProvider};

impl QueueProvider {
    /// Loads archived snapshots for `symbols`, ordered by snapshot timestamp.
    pub fn from_archive(
        id: impl Into<String>,
        dir: &Path,
        symbols: &[String],
    ) -> Result<Self, ProviderError> {
        let provider = QueueProvider::new(id);

        for symbol in symbols {
            let path = dir.join(format!("{symbol}.jsonl"));
            let raw = fs::read_to_string(&path)?;

            let mut snapshots = raw
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str::<OptionChainSnapshot>)
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(other) = snapshots.iter().find(|s| s.symbol() != symbol) {
                return Err(ProviderError::InvalidPayload(format!(
                    "{} contains a snapshot for {}",
                    path.display(),
                    other.symbol()
                )));
            }

            snapshots.sort_by_key(|s| s.timestamp());

            info!(
                symbol = %symbol,
                snapshots = snapshots.len(),
                path = %path.display(),
                "archive loaded"
            );

            for s in snapshots {
                provider.push(s);
            }
        }

        Ok(provider)
    }
}
