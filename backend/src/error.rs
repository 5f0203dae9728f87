use engine::ThresholdError;
use thiserror::Error;

/// Invalid or inconsistent configuration. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("utc offset of {0} minutes is out of range")]
    UtcOffset(i32),

    #[error("alert_equals_epsilon must be a non-negative finite number, got {0}")]
    Epsilon(f64),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("provider {0} appears more than once")]
    DuplicateProvider(String),

    #[error("provider {0} in the priority order is not registered")]
    UnknownProvider(String),

    #[error("no market data providers registered")]
    NoProviders,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("instrument {0} is already watched")]
    AlreadyWatched(String),

    #[error("instrument {0} is not watched")]
    NotWatched(String),

    #[error("driver has been shut down")]
    ShutDown,

    #[error("lane for {0} stopped unexpectedly")]
    LaneGone(String),
}
