//! Structured logging setup.

use std::env;

use tracing_subscriber::{EnvFilter, fmt};

/// Set to any value to emit JSON log lines.
pub const LOG_JSON_ENV: &str = "METEOMERGE_LOG_JSON";
const DEFAULT_FILTER: &str = "meteomerge=info,tower_http=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if env::var_os(LOG_JSON_ENV).is_some() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
