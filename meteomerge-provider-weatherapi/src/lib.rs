//! Provider implementation for WeatherAPI.com daily maximum temperatures.
//!
//! WeatherAPI needs an API key, so [`WeatherApiCaller`] refuses to be built
//! without one. The key travels in the query string and is masked in every log
//! line and error message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use meteomerge_core::{
    model::{Coordinates, FiveDayForecast, ProviderMeta, Providers, Sample},
    pipeline::CallerContext,
    plugin::ProviderPlugin,
    ports::{DailyEndpoint, DecodeError, ForecastPort, PortError},
};

const BASE_URL: &str = "https://api.weatherapi.com";
const FORECAST_PATH: &str = "/v1/forecast.json";
const DATE_FORMAT: &str = "%Y-%m-%d";
const PROVIDER_NAME: &str = "WeatherAPI";

/// Response from /v1/forecast.json
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    forecast: Forecast,
    // "location" and "current" blocks are ignored
}

#[derive(Debug, Deserialize)]
struct Forecast {
    #[serde(rename = "forecastday", alias = "forecastDay")]
    days: Vec<ForecastDay>,
}

/// One entry of `forecast.forecastday`
#[derive(Debug, Deserialize)]
struct ForecastDay {
    date: String, // "YYYY-MM-DD"
    day: DaySummary,
}

/// Daily aggregates; only the maximum is modelled.
#[derive(Debug, Deserialize)]
struct DaySummary {
    #[serde(rename = "maxtemp_c")]
    max_temp_c: f64,
}

/// Encodes single-day requests carrying the API key and decodes forecast days.
pub struct WeatherApiEndpoint {
    base: Url,
    api_key: String,
}

impl WeatherApiEndpoint {
    /// Endpoint rooted at `base` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingCredential`] for a blank key and
    /// [`PortError::InvalidUrl`] when `base` is not an absolute URL.
    pub fn new(base: &str, api_key: &str) -> Result<Self, PortError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(PortError::MissingCredential {
                provider: PROVIDER_NAME.to_owned(),
            });
        }

        let base =
            Url::parse(base).map_err(|err| PortError::InvalidUrl(format!("{base}: {err}")))?;
        Ok(Self {
            base,
            api_key: api_key.to_owned(),
        })
    }
}

impl DailyEndpoint for WeatherApiEndpoint {
    fn daily_url(&self, date: NaiveDate, coordinates: Coordinates) -> Result<Url, PortError> {
        let mut url = self
            .base
            .join(FORECAST_PATH)
            .map_err(|err| PortError::InvalidUrl(err.to_string()))?;

        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("q", &format!("{:.6},{:.6}", coordinates.lat, coordinates.lon))
            .append_pair("date", &date.to_string())
            .append_pair("day", "maxtemp_c");

        Ok(url)
    }

    fn first_sample(&self, body: &[u8]) -> Result<Sample, DecodeError> {
        let response: ForecastResponse = serde_json::from_slice(body)?;
        let first = response.forecast.days.first().ok_or(DecodeError::Empty)?;
        let date = NaiveDate::parse_from_str(&first.date, DATE_FORMAT)?;
        Ok(Sample::new(date, first.day.max_temp_c))
    }
}

/// Five-day forecast caller for WeatherAPI.com.
pub struct WeatherApiCaller {
    meta: ProviderMeta,
    endpoint: WeatherApiEndpoint,
    context: CallerContext,
}

impl WeatherApiCaller {
    /// Create a caller against the public WeatherAPI service.
    ///
    /// The key is checked here, before any request can be made.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingCredential`] when `api_key` is blank.
    pub fn new(api_key: &str, context: CallerContext) -> Result<Self, PortError> {
        Self::with_base_url(api_key, context, BASE_URL)
    }

    /// Create a caller against a different deployment or a test server.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::MissingCredential`] when `api_key` is blank and
    /// [`PortError::InvalidUrl`] when `base` is not an absolute URL.
    pub fn with_base_url(
        api_key: &str,
        context: CallerContext,
        base: &str,
    ) -> Result<Self, PortError> {
        Ok(Self {
            meta: provider_meta(),
            endpoint: WeatherApiEndpoint::new(base, api_key)?,
            context,
        })
    }
}

#[async_trait]
impl ForecastPort for WeatherApiCaller {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn aggregate_weather(
        &self,
        coordinates: Coordinates,
    ) -> Result<FiveDayForecast, PortError> {
        debug!(
            lat = coordinates.lat,
            lon = coordinates.lon,
            "Aggregating WeatherAPI forecast"
        );
        self.context.five_days(&self.endpoint, coordinates).await
    }
}

/// Build the plugin bundle for the WeatherAPI provider.
///
/// # Errors
///
/// See [`WeatherApiCaller::with_base_url`].
pub fn plugin(
    api_key: &str,
    context: CallerContext,
    base: Option<&str>,
) -> Result<ProviderPlugin, PortError> {
    let caller = WeatherApiCaller::with_base_url(api_key, context, base.unwrap_or(BASE_URL))?;
    Ok(ProviderPlugin::from_port(Arc::new(caller)))
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: Providers::WeatherApi.into(),
        name: PROVIDER_NAME.to_owned(),
    }
}
