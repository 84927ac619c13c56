//! High-level service facade combining all providers.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::model::{AggregateResult, Coordinates, ProviderKey, ProviderMeta};
use crate::plugin::ProviderRegistry;
use crate::ports::PortError;

#[derive(thiserror::Error, Debug)]
/// Errors surfaced to the HTTP layer.
pub enum ServiceError {
    /// A provider call failed; later providers were not asked.
    #[error("Request API {key} ({provider}) failed: {source}")]
    Provider {
        /// Publication key of the failing provider.
        key: ProviderKey,
        /// Display name of the failing provider.
        provider: String,
        /// What went wrong.
        #[source]
        source: PortError,
    },
}

/// Public entry point merging every registered provider into one result.
pub struct AggregationService {
    registry: Arc<ProviderRegistry>,
}

impl AggregationService {
    /// Create a new service bound to the provided registry.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// List all registered providers in registration order.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderMeta> {
        self.registry.providers()
    }

    /// Ask every provider, one after another, for five days at `coordinates`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Provider`] for the first provider that fails; no
    /// further provider is called and no partial result is returned.
    pub async fn aggregate(
        &self,
        coordinates: Coordinates,
    ) -> Result<AggregateResult, ServiceError> {
        let mut result = AggregateResult::default();

        for (key, plugin) in self.registry.keyed() {
            let started = Instant::now();
            match plugin.forecast_port.aggregate_weather(coordinates).await {
                Ok(forecast) => {
                    info!(
                        provider = %plugin.meta.id,
                        key = %key,
                        elapsed = ?started.elapsed(),
                        "Provider forecast assembled"
                    );
                    result.push(key, forecast);
                }
                Err(source) => {
                    warn!(
                        provider = %plugin.meta.id,
                        key = %key,
                        error = %source,
                        "Provider failed, aborting aggregation"
                    );
                    return Err(ServiceError::Provider {
                        key,
                        provider: plugin.meta.name.clone(),
                        source,
                    });
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use reqwest::StatusCode;

    use super::*;
    use crate::model::{FiveDayForecast, Sample};
    use crate::plugin::ProviderPlugin;
    use crate::ports::ForecastPort;
    use crate::testing::StubPort;

    fn forecast(first_max: f64) -> FiveDayForecast {
        let start = NaiveDate::from_ymd_opt(2024, 11, 5).expect("valid date");
        let mut days = start.iter_days();
        let mut next = |offset: f64| {
            let date = days.next().expect("dates left");
            Sample::new(date, first_max + offset)
        };
        FiveDayForecast::from_days([next(0.0), next(1.0), next(2.0), next(3.0), next(4.0)])
    }

    fn here() -> Coordinates {
        Coordinates::new(42.649_393_4, -8.820_175_3).expect("valid coordinates")
    }

    fn service(ports: &[Arc<StubPort>]) -> AggregationService {
        let plugins = ports
            .iter()
            .map(|port| {
                let port: Arc<dyn ForecastPort> = Arc::<StubPort>::clone(port);
                ProviderPlugin::from_port(port)
            })
            .collect();
        AggregationService::new(Arc::new(ProviderRegistry::new(plugins)))
    }

    #[tokio::test]
    async fn merges_providers_under_registration_keys() {
        let first = Arc::new(StubPort::succeeding("first", forecast(20.0)));
        let second = Arc::new(StubPort::succeeding("second", forecast(10.0)));

        let result = service(&[Arc::clone(&first), Arc::clone(&second)])
            .aggregate(here())
            .await
            .expect("both succeed");

        assert_eq!(result.len(), 2);
        assert_eq!(result.get("weatherAPI1"), Some(&forecast(20.0)));
        assert_eq!(result.get("weatherAPI2"), Some(&forecast(10.0)));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn first_failure_aborts_before_later_providers() {
        let failing = Arc::new(StubPort::failing("failing", StatusCode::SERVICE_UNAVAILABLE));
        let never = Arc::new(StubPort::succeeding("never", forecast(10.0)));

        let err = service(&[Arc::clone(&failing), Arc::clone(&never)])
            .aggregate(here())
            .await
            .expect_err("first provider fails");

        let ServiceError::Provider { key, source, .. } = &err;
        assert_eq!(key.0, "weatherAPI1");
        assert!(
            matches!(
                source,
                PortError::UnexpectedStatus { status, .. }
                    if *status == StatusCode::SERVICE_UNAVAILABLE
            ),
            "{err}"
        );
        assert_eq!(failing.calls(), 1);
        assert_eq!(never.calls(), 0, "later providers must not be called");
    }

    #[tokio::test]
    async fn failure_of_the_last_provider_discards_earlier_results() {
        let fine = Arc::new(StubPort::succeeding("fine", forecast(20.0)));
        let failing = Arc::new(StubPort::failing("failing", StatusCode::BAD_GATEWAY));

        let err = service(&[Arc::clone(&fine), Arc::clone(&failing)])
            .aggregate(here())
            .await
            .expect_err("second provider fails");

        let ServiceError::Provider { key, .. } = &err;
        assert_eq!(key.0, "weatherAPI2");
        assert_eq!(fine.calls(), 1);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_result() {
        let result = service(&[]).aggregate(here()).await.expect("nothing to fail");
        assert!(result.is_empty(), "no providers registered");
    }
}
