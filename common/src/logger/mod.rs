mod init;
mod perf;
mod spans;
mod trace_id;

pub use init::init_logger;
pub use perf::warn_if_slow;
pub use spans::{annotate_span, instrument_span, root_span};
pub use trace_id::TraceId;
