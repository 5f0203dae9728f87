//! Trading-hours gate.
//!
//! Windows are expressed as minute-of-day in one fixed reference zone
//! (IST by default). A window whose close is at or before its open spans
//! midnight.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use corelib::models::MarketType;

pub const IST_OFFSET_SECS: i32 = 5 * 3_600 + 30 * 60;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Open/close pair in minutes past local midnight, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    open: u32,
    close: u32,
}

impl TradingWindow {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            open: minute_of_day(open),
            close: minute_of_day(close),
        }
    }

    pub const fn from_hm(open_h: u32, open_m: u32, close_h: u32, close_m: u32) -> Self {
        Self {
            open: (open_h * 60 + open_m) % MINUTES_PER_DAY,
            close: (close_h * 60 + close_m) % MINUTES_PER_DAY,
        }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.close <= self.open
    }

    pub fn contains(&self, minute: u32) -> bool {
        if self.crosses_midnight() {
            minute >= self.open || minute <= self.close
        } else {
            minute >= self.open && minute <= self.close
        }
    }
}

impl fmt::Display for TradingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.open / 60,
            self.open % 60,
            self.close / 60,
            self.close % 60
        )
    }
}

/// Parses `HH:MM-HH:MM`.
impl FromStr for TradingWindow {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (open, close) = s.split_once('-').unwrap_or((s, ""));
        let open = NaiveTime::parse_from_str(open.trim(), "%H:%M")?;
        let close = NaiveTime::parse_from_str(close.trim(), "%H:%M")?;
        Ok(Self::new(open, close))
    }
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    Live,
    /// Archived data; trading hours are not consulted.
    Replay,
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGate {
    Open,
    Closed,
    Replay,
}

impl SessionGate {
    pub fn allows_analysis(self) -> bool {
        !matches!(self, SessionGate::Closed)
    }
}

#[derive(Debug, Clone)]
pub struct SessionClock {
    zone: FixedOffset,
    windows: HashMap<MarketType, TradingWindow>,
    mode: ClockMode,
}

impl SessionClock {
    pub fn new(zone: FixedOffset, mode: ClockMode) -> Self {
        Self {
            zone,
            windows: HashMap::new(),
            mode,
        }
    }

    /// Indian market hours in IST.
    pub fn india(mode: ClockMode) -> Self {
        let zone = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix());

        Self::new(zone, mode)
            .with_window(MarketType::Equity, TradingWindow::from_hm(9, 15, 15, 30))
            .with_window(MarketType::Commodity, TradingWindow::from_hm(9, 0, 23, 30))
            .with_window(MarketType::Currency, TradingWindow::from_hm(9, 0, 17, 0))
    }

    pub fn with_window(mut self, market: MarketType, window: TradingWindow) -> Self {
        self.windows.insert(market, window);
        self
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn window(&self, market: MarketType) -> Option<TradingWindow> {
        self.windows.get(&market).copied()
    }

    /// Whether `market` is trading at `instant`. Always `false` in replay
    /// mode; markets without a configured window are closed.
    pub fn is_open(&self, market: MarketType, instant: DateTime<Utc>) -> bool {
        match self.mode {
            ClockMode::Replay => false,
            ClockMode::Live => self.within_hours(market, instant),
        }
    }

    /// Single evaluation deciding whether analysis may run.
    pub fn gate(&self, market: MarketType, instant: DateTime<Utc>) -> SessionGate {
        match self.mode {
            ClockMode::Replay => SessionGate::Replay,
            ClockMode::Live if self.within_hours(market, instant) => SessionGate::Open,
            ClockMode::Live => SessionGate::Closed,
        }
    }

    fn within_hours(&self, market: MarketType, instant: DateTime<Utc>) -> bool {
        let Some(window) = self.windows.get(&market) else {
            return false;
        };

        let local = instant.with_timezone(&self.zone);
        window.contains(minute_of_day(local.time()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist(h: u32, m: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(IST_OFFSET_SECS)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 15, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn equity_hours_are_inclusive_at_both_ends() {
        let clock = SessionClock::india(ClockMode::Live);

        assert!(!clock.is_open(MarketType::Equity, ist(8, 59)));
        assert!(clock.is_open(MarketType::Equity, ist(9, 15)));
        assert!(clock.is_open(MarketType::Equity, ist(12, 0)));
        assert!(clock.is_open(MarketType::Equity, ist(15, 30)));
        assert!(!clock.is_open(MarketType::Equity, ist(15, 31)));
    }

    #[test]
    fn window_crossing_midnight_spans_two_days() {
        let clock = SessionClock::india(ClockMode::Live)
            .with_window(MarketType::Currency, TradingWindow::from_hm(22, 0, 2, 0));

        assert!(clock.is_open(MarketType::Currency, ist(23, 45)));
        assert!(clock.is_open(MarketType::Currency, ist(0, 30)));
        assert!(clock.is_open(MarketType::Currency, ist(2, 0)));
        assert!(!clock.is_open(MarketType::Currency, ist(2, 1)));
        assert!(!clock.is_open(MarketType::Currency, ist(21, 59)));
    }

    #[test]
    fn replay_reports_closed_but_allows_analysis() {
        let clock = SessionClock::india(ClockMode::Replay);

        assert!(!clock.is_open(MarketType::Equity, ist(10, 0)));
        assert_eq!(clock.gate(MarketType::Equity, ist(3, 0)), SessionGate::Replay);
        assert!(clock.gate(MarketType::Equity, ist(3, 0)).allows_analysis());
    }

    #[test]
    fn live_gate_follows_hours() {
        let clock = SessionClock::india(ClockMode::Live);

        assert_eq!(clock.gate(MarketType::Equity, ist(10, 0)), SessionGate::Open);
        assert_eq!(clock.gate(MarketType::Equity, ist(16, 0)), SessionGate::Closed);
        assert!(!clock.gate(MarketType::Equity, ist(16, 0)).allows_analysis());
    }

    #[test]
    fn unconfigured_market_is_closed() {
        let clock = SessionClock::new(Utc.fix(), ClockMode::Live);
        assert!(!clock.is_open(MarketType::Commodity, ist(12, 0)));
    }

    #[test]
    fn parses_window_strings() {
        let w: TradingWindow = "09:15-15:30".parse().unwrap();
        assert_eq!(w, TradingWindow::from_hm(9, 15, 15, 30));
        assert_eq!(w.to_string(), "09:15-15:30");
        assert!("09:15".parse::<TradingWindow>().is_err());
    }
}
