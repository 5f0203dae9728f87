//! Option chain snapshot model.
//!
//! A snapshot is one timestamped capture of the full chain for an instrument.
//! It is validated on construction (and on deserialization) and never mutated
//! afterwards; a newer capture replaces it wholesale.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketType {
    Equity,
    Commodity,
    Currency,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketType::Equity => "EQUITY",
            MarketType::Commodity => "COMMODITY",
            MarketType::Currency => "CURRENCY",
        };
        f.write_str(s)
    }
}

impl FromStr for MarketType {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EQUITY" => Ok(MarketType::Equity),
            "COMMODITY" => Ok(MarketType::Commodity),
            "CURRENCY" => Ok(MarketType::Currency),
            other => Err(ChainError::UnknownMarket(other.to_string())),
        }
    }
}

/// A tradable underlying with a single expiry. `symbol` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub symbol: String,
    pub market_type: MarketType,
    pub expiry: NaiveDate,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, market_type: MarketType, expiry: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            market_type,
            expiry,
        }
    }
}

/// Parses `SYMBOL:MARKET:YYYY-MM-DD`, e.g. `NIFTY:EQUITY:2026-10-29`.
impl FromStr for Instrument {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(symbol), Some(market), Some(expiry), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ChainError::InvalidInstrument(s.to_string()));
        };

        if symbol.trim().is_empty() {
            return Err(ChainError::EmptySymbol);
        }

        let expiry = NaiveDate::parse_from_str(expiry, "%Y-%m-%d")
            .map_err(|_| ChainError::InvalidInstrument(s.to_string()))?;

        Ok(Self::new(symbol.trim(), market.parse()?, expiry))
    }
}

/// One strike of the chain: call side and its put-side mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrikeRow {
    pub strike: f64,

    #[serde(rename = "callOI")]
    pub call_oi: f64,
    #[serde(rename = "callOIChange")]
    pub call_oi_change: f64,
    #[serde(rename = "callLTP")]
    pub call_ltp: f64,
    #[serde(rename = "callLTPChange")]
    pub call_ltp_change: f64,
    #[serde(rename = "callVolume")]
    pub call_volume: f64,

    #[serde(rename = "putOI")]
    pub put_oi: f64,
    #[serde(rename = "putOIChange")]
    pub put_oi_change: f64,
    #[serde(rename = "putLTP")]
    pub put_ltp: f64,
    #[serde(rename = "putLTPChange")]
    pub put_ltp_change: f64,
    #[serde(rename = "putVolume")]
    pub put_volume: f64,
}

impl StrikeRow {
    fn check_finite(&self) -> Result<(), ChainError> {
        let fields = [
            ("strike", self.strike),
            ("callOI", self.call_oi),
            ("callOIChange", self.call_oi_change),
            ("callLTP", self.call_ltp),
            ("callLTPChange", self.call_ltp_change),
            ("callVolume", self.call_volume),
            ("putOI", self.put_oi),
            ("putOIChange", self.put_oi_change),
            ("putLTP", self.put_ltp),
            ("putLTPChange", self.put_ltp_change),
            ("putVolume", self.put_volume),
        ];

        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((field, _)) => Err(ChainError::NonFinite { field: *field }),
            None => Ok(()),
        }
    }
}

/// Wire shape accepted from providers before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRecord {
    instrument: Instrument,
    timestamp: DateTime<Utc>,
    ltp: f64,
    #[serde(default)]
    change: f64,
    #[serde(default)]
    change_percent: f64,
    #[serde(default)]
    volume: f64,
    strikes: Vec<StrikeRow>,
}

impl TryFrom<SnapshotRecord> for OptionChainSnapshot {
    type Error = ChainError;

    fn try_from(r: SnapshotRecord) -> Result<Self, Self::Error> {
        OptionChainSnapshot::new(
            r.instrument,
            r.timestamp,
            r.ltp,
            r.change,
            r.change_percent,
            r.volume,
            r.strikes,
        )
    }
}

/// Immutable option chain capture. Strikes are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SnapshotRecord")]
pub struct OptionChainSnapshot {
    instrument: Instrument,
    timestamp: DateTime<Utc>,
    ltp: f64,
    change: f64,
    change_percent: f64,
    volume: f64,
    strikes: Vec<StrikeRow>,
}

impl OptionChainSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument: Instrument,
        timestamp: DateTime<Utc>,
        ltp: f64,
        change: f64,
        change_percent: f64,
        volume: f64,
        strikes: Vec<StrikeRow>,
    ) -> Result<Self, ChainError> {
        if instrument.symbol.trim().is_empty() {
            return Err(ChainError::EmptySymbol);
        }

        for (field, v) in [
            ("ltp", ltp),
            ("change", change),
            ("changePercent", change_percent),
            ("volume", volume),
        ] {
            if !v.is_finite() {
                return Err(ChainError::NonFinite { field });
            }
        }

        for row in &strikes {
            row.check_finite()?;
        }

        if let Some(w) = strikes.windows(2).find(|w| w[1].strike <= w[0].strike) {
            return Err(ChainError::UnorderedStrikes {
                previous: w[0].strike,
                next: w[1].strike,
            });
        }

        Ok(Self {
            instrument,
            timestamp,
            ltp,
            change,
            change_percent,
            volume,
            strikes,
        })
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Last traded price of the underlying.
    pub fn ltp(&self) -> f64 {
        self.ltp
    }

    pub fn change(&self) -> f64 {
        self.change
    }

    pub fn change_percent(&self) -> f64 {
        self.change_percent
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn strikes(&self) -> &[StrikeRow] {
        &self.strikes
    }

    /// Binary search by strike price; strikes are sorted.
    pub fn row(&self, strike: f64) -> Option<&StrikeRow> {
        self.strikes
            .binary_search_by(|r| r.strike.total_cmp(&strike))
            .ok()
            .map(|i| &self.strikes[i])
    }
}
