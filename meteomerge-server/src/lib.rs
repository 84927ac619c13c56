//! HTTP service wiring for meteomerge: configuration, logging, routes, and shutdown.

/// TOML configuration with defaults.
pub mod config;
/// Tracing subscriber setup.
pub mod logging;
/// Axum handlers and router.
pub mod routes;
/// Ctrl-C handling that also stops in-flight provider fetches.
pub mod shutdown;
