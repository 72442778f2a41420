//! Logging initialization.
//!
//! Library code only uses `tracing` macros; the binary calls
//! [`init_logging`] once at startup.

use crate::config::{LogFormat, DEFAULT_LOG_LEVEL};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber on stderr.
///
/// `RUST_LOG` takes precedence over `level` when set. `level` accepts any
/// filter directive (`debug`, `log_shipper=trace,warn`). Calling this more
/// than once keeps the first subscriber.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Filter for the configured level, or the default level if it does not parse.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}
