use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber. Later calls are no-ops.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. `json` switches the
/// fmt layer to one JSON object per line.
pub fn init_logger(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        let registry = tracing_subscriber::registry().with(filter);

        // A subscriber may already be installed (tests, embedding apps).
        let installed = if json {
            registry.with(base.json()).try_init()
        } else {
            registry.with(base).try_init()
        };

        match installed {
            Ok(()) => tracing::info!(service = service_name, json, "logger initialized"),
            Err(e) => tracing::debug!(service = service_name, error = %e, "logger already set"),
        }
    });
}
