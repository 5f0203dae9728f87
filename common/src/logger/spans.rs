use tracing::{Span, field};

use super::TraceId;

/// Root span for one run (a `live` session, a replay).
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id,
        mode = field::Empty
    )
}

/// Span for work scoped to one instrument. `tick` is filled in later via
/// [`annotate_span`].
pub fn instrument_span(name: &'static str, symbol: &str) -> Span {
    tracing::info_span!(
        "lane",
        name = %name,
        instrument = %symbol,
        tick = field::Empty
    )
}

/// Record the tick counter on the current span, if it declares one.
pub fn annotate_span(tick: u64) {
    Span::current().record("tick", tick);
}
