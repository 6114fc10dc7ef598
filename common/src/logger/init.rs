use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber.
///
/// `json = true` is meant for production log shipping, otherwise output is
/// pretty-printed. Safe to call more than once; only the first call installs
/// anything.
pub fn init_logger(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_target(true) // <-- shows crate/module path
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        // try_init: a test harness may already own the global subscriber.
        let installed = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.pretty())
                .try_init()
        };

        if installed.is_ok() {
            tracing::info!(service = service_name, "logger initialized");
        }
    });
}
