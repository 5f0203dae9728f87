pub mod logger;

pub use logger::{TraceId, annotate_span, init_logger, instrument_span, root_span, warn_if_slow};
