use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("instrument symbol must not be empty")]
    EmptySymbol,

    #[error("strikes must be strictly increasing: {previous} followed by {next}")]
    UnorderedStrikes { previous: f64, next: f64 },

    #[error("non-finite value in field `{field}`")]
    NonFinite { field: &'static str },

    #[error("invalid instrument `{0}`, expected SYMBOL:MARKET:YYYY-MM-DD")]
    InvalidInstrument(String),

    #[error("unknown market type `{0}`")]
    UnknownMarket(String),
}
