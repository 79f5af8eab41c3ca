//! Process-wide tracing setup. Call once at startup.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Installs the global subscriber. Returns `false` if one was already set,
/// in which case the existing subscriber is left untouched.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
