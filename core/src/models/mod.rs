pub mod alert;
pub mod chain;
pub mod event;
pub mod metrics;
pub mod pattern;

pub use alert::{AlertCondition, AlertFiring, AlertRule, AlertType, Channel};
pub use chain::{Instrument, MarketType, OptionChainSnapshot, StrikeRow};
pub use event::{Envelope, MarketEvent, ProviderOutage, StaleData};
pub use metrics::{DerivedMetrics, StrikeMetrics, Velocity};
pub use pattern::{PatternEvent, PatternType, Strength};
