pub mod config;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod rules;

pub use config::AppConfig;
pub use driver::{Driver, TickOutcome};
pub use error::{AppError, ConfigError};
pub use pipeline::PipelineContext;
pub use rules::{BookEntry, RuleBook};
