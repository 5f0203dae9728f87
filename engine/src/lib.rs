pub mod alert;
pub mod dispatch;
pub mod metrics;
pub mod pattern;
pub mod rolling_window;

pub use alert::{AlertEvaluator, AlertState, RuleEvaluationError};
pub use dispatch::{ChannelSubscriber, DeliveryPolicy, Dispatcher, LogSubscriber, Subscriber};
pub use metrics::{MetricsEngine, MetricsError};
pub use pattern::{
    ConfidenceScorer, PatternConfig, PatternDetector, PatternState, SaturatingExcessScorer, Signal,
    ThresholdError,
};
