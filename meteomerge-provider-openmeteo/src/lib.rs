//! Provider implementation for Open-Meteo daily maximum temperatures.

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

const BASE_URL: &str = "https://api.open-meteo.com";
const FORECAST_PATH: &str = "/v1/forecast";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Response from /v1/forecast with `daily=temperature_2m_max`
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: Daily,
    // latitude, longitude, timezone and units exist too; not needed
}

/// Column-oriented daily block; both arrays share their index.
#[derive(Debug, Deserialize)]
struct Daily {
    time: Vec<String>,
    // null for days outside the model horizon
    temperature_2m_max: Vec<Option<f64>>,
}

/// Encodes single-day requests and decodes daily blocks.
pub struct OpenMeteoEndpoint {
    base: Url,
}

impl OpenMeteoEndpoint {
    /// Endpoint rooted at `base` (scheme and host, e.g. `https://api.open-meteo.com`).
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidUrl`] when `base` is not an absolute URL.
    pub fn new(base: &str) -> Result<Self, PortError> {
        let base = Url::parse(base).map_err(|err| PortError::InvalidUrl(format!("{base}: {err}")))?;
        Ok(Self { base })
    }
}

impl DailyEndpoint for OpenMeteoEndpoint {
    fn daily_url(&self, date: NaiveDate, coordinates: Coordinates) -> Result<Url, PortError> {
        let mut url = self
            .base
            .join(FORECAST_PATH)
            .map_err(|err| PortError::InvalidUrl(err.to_string()))?;

        // start and end are the same day; one request per day keeps every sample independent
        let day = date.to_string();
        url.query_pairs_mut()
            .append_pair("latitude", &format!("{:.6}", coordinates.lat))
            .append_pair("longitude", &format!("{:.6}", coordinates.lon))
            .append_pair("start_date", &day)
            .append_pair("end_date", &day)
            .append_pair("daily", "temperature_2m_max");

        Ok(url)
    }

    fn first_sample(&self, body: &[u8]) -> Result<Sample, DecodeError> {
        let response: ForecastResponse = serde_json::from_slice(body)?;

        let (Some(day), Some(Some(max_temp))) = (
            response.daily.time.first(),
            response.daily.temperature_2m_max.first(),
        ) else {
            return Err(DecodeError::Empty);
        };

        let date = NaiveDate::parse_from_str(day, DATE_FORMAT)?;
        Ok(Sample::new(date, *max_temp))
    }
}

/// Five-day forecast caller for Open-Meteo.
pub struct OpenMeteoCaller {
    meta: ProviderMeta,
    endpoint: OpenMeteoEndpoint,
    context: CallerContext,
}

impl OpenMeteoCaller {
    /// Create a caller against the public Open-Meteo API.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in base URL; the signature matches
    /// [`OpenMeteoCaller::with_base_url`].
    pub fn new(context: CallerContext) -> Result<Self, PortError> {
        Self::with_base_url(context, BASE_URL)
    }

    /// Create a caller against a different deployment or a test server.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidUrl`] when `base` is not an absolute URL.
    pub fn with_base_url(context: CallerContext, base: &str) -> Result<Self, PortError> {
        Ok(Self {
            meta: provider_meta(),
            endpoint: OpenMeteoEndpoint::new(base)?,
            context,
        })
    }
}

#[async_trait]
impl ForecastPort for OpenMeteoCaller {
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
            "Aggregating Open-Meteo forecast"
        );
        self.context.five_days(&self.endpoint, coordinates).await
    }
}

/// Build the plugin bundle for the Open-Meteo provider.
///
/// # Errors
///
/// Returns [`PortError::InvalidUrl`] when `base` is not an absolute URL.
pub fn plugin(context: CallerContext, base: Option<&str>) -> Result<ProviderPlugin, PortError> {
    let caller = OpenMeteoCaller::with_base_url(context, base.unwrap_or(BASE_URL))?;
    Ok(ProviderPlugin::from_port(Arc::new(caller)))
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: Providers::OpenMeteo.into(),
        name: String::from("Open-Meteo"),
    }
}
