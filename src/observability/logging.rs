//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Pick the log level from the environment or configuration
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Pretty format for interactive use, compact otherwise
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed (e.g. by a test
/// harness); the existing one stays in place.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let (pretty, compact) = if config.log_format.eq_ignore_ascii_case("pretty") {
        (Some(fmt::layer().pretty()), None)
    } else {
        (None, Some(fmt::layer().compact()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(compact)
        .try_init()
        .is_ok()
}

/// Filter directive for `level`, keeping dependency noise at `warn` unless
/// tracing is requested.
fn default_directive(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let level = match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => level.as_str(),
        _ => "info",
    };
    format!("site_serve={level},tower_http={level}")
}
