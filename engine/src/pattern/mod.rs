pub mod config;
pub mod detector;
pub mod scorer;
pub mod state;

pub use config::{PatternConfig, ThresholdError};
pub use detector::PatternDetector;
pub use scorer::{ConfidenceScorer, SaturatingExcessScorer, Signal};
pub use state::PatternState;
