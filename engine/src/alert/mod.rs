pub mod evaluator;
pub mod state;

pub use evaluator::AlertEvaluator;
pub use state::{AlertState, Phase};

use thiserror::Error;

/// A rule that cannot be evaluated. The rule is skipped; others proceed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleEvaluationError {
    #[error("rule has an empty id")]
    MissingId,

    #[error("rule {rule_id} has a non-finite target {target}")]
    NonFiniteTarget { rule_id: String, target: f64 },
}
