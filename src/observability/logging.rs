//! Structured logging.
//!
//! # Severities
//! ```text
//! Info / Warn / Error → tracing levels of the same name
//! Alert               → warn! on target "proxyd::alert" (operator notices)
//! Fatal               → error! in main, then exit status 1
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON lines for machine consumption, plain text otherwise

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Target carrying operator-facing notices.
pub const ALERT_TARGET: &str = "proxyd::alert";

/// Log an operator-facing notice.
#[macro_export]
macro_rules! alert {
    ($($arg:tt)+) => {
        ::tracing::warn!(target: $crate::observability::logging::ALERT_TARGET, $($arg)+)
    };
}

/// Install the global tracing subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}
