//! Registry for all provider plugins, kept in registration order.

use std::sync::Arc;

use crate::model::{ProviderKey, ProviderMeta};
use crate::ports::ForecastPort;

/// A provider caller bundled with its metadata.
pub struct ProviderPlugin {
    /// Static metadata describing the provider.
    pub meta: ProviderMeta,
    /// Implementation fetching five-day forecasts.
    pub forecast_port: Arc<dyn ForecastPort>,
}

impl ProviderPlugin {
    /// Bundle a port with the metadata it reports about itself.
    #[must_use]
    pub fn from_port(forecast_port: Arc<dyn ForecastPort>) -> Self {
        Self {
            meta: forecast_port.provider().clone(),
            forecast_port,
        }
    }
}

/// Registry that hands out plugins in the order they were registered.
///
/// The position of a plugin decides the key its forecast is published under.
pub struct ProviderRegistry {
    plugins: Vec<ProviderPlugin>,
}

impl ProviderRegistry {
    /// Build a registry from the provided plugin list.
    #[must_use]
    pub fn new(plugins: Vec<ProviderPlugin>) -> Self {
        Self { plugins }
    }

    /// Return metadata for all registered providers.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderMeta> {
        self.providers_iter().cloned().collect()
    }

    /// Iterator over provider metadata.
    pub fn providers_iter(&self) -> impl Iterator<Item = &ProviderMeta> {
        self.plugins.iter().map(|plugin| &plugin.meta)
    }

    /// Plugins paired with their publication key, in registration order.
    pub fn keyed(&self) -> impl Iterator<Item = (ProviderKey, &ProviderPlugin)> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(position, plugin)| (ProviderKey::for_position(position), plugin))
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
