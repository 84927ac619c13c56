//! Core types, fetch-and-assemble pipeline, and service wiring for the meteomerge
//! forecast aggregator.

/// Clocks deciding the first forecast day.
pub mod clock;
/// Domain models and identifiers shared by all providers.
pub mod model;
/// Per-provider fetch and assembly stages and their supervisor.
pub mod pipeline;
/// Registry for plugging provider callers into the service.
pub mod plugin;
/// Traits describing the provider and transport interfaces.
pub mod ports;
/// High-level service facade used by the HTTP layer.
pub mod service;
/// Test doubles for transports and provider ports.
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
/// Production HTTP transport.
pub mod transport;

pub use clock::*;
pub use model::*;
pub use pipeline::*;
pub use plugin::*;
pub use ports::*;
pub use service::*;
pub use transport::*;
