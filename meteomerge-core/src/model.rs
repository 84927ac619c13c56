//! Domain data structures for coordinates, daily samples, and merged forecasts.

use std::fmt;

use chrono::NaiveDate;
use reqwest::Url;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::ports::CoordinateError;

/// Number of consecutive days requested from every provider.
pub const FORECAST_DAYS: usize = 5;

/// Built-in weather providers.
pub enum Providers {
    /// Open-Meteo, keyless.
    OpenMeteo,
    /// WeatherAPI.com, requires an API key.
    WeatherApi,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a provider known to meteomerge.
pub struct ProviderId(pub String);

impl fmt::Display for Providers {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Providers::OpenMeteo => "openmeteo",
            Providers::WeatherApi => "weatherapi",
        };
        write!(formatter, "{slug}")
    }
}

impl From<Providers> for ProviderId {
    fn from(provider: Providers) -> Self {
        ProviderId(provider.to_string())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a provider and its human-friendly name.
pub struct ProviderMeta {
    /// Unique identifier.
    pub id: ProviderId,
    /// Display name used in logs.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
/// Key a provider's forecast is published under, derived from its registration position.
pub struct ProviderKey(pub String);

impl ProviderKey {
    /// Key for the provider registered at `position` (zero-based).
    #[must_use]
    pub fn for_position(position: usize) -> Self {
        ProviderKey(format!("weatherAPI{}", position.saturating_add(1)))
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Position on the globe in decimal degrees.
pub struct Coordinates {
    /// Latitude within `[-90, 90]`.
    pub lat: f64,
    /// Longitude within `[-180, 180]`.
    pub lon: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting values that are not on the globe.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::OutOfBounds`] when either value is outside its range or not
    /// finite.
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
        let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);
        if lat_ok && lon_ok {
            Ok(Self { lat, lon })
        } else {
            Err(CoordinateError::OutOfBounds { lat, lon })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Forecast maximum temperature for a single day.
pub struct Sample {
    /// Day the forecast applies to.
    pub date: NaiveDate,
    /// Daily maximum in °C.
    #[serde(rename = "maxTemp")]
    pub max_temp: f64,
}

impl Sample {
    /// Construct a new sample.
    #[must_use]
    pub fn new(date: NaiveDate, max_temp: f64) -> Self {
        Self { date, max_temp }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One planned provider request for a single day.
pub struct RequestDescriptor {
    /// Position in the plan, zero-based.
    pub index: usize,
    /// Day being requested.
    pub date: NaiveDate,
    /// Location being requested.
    pub coordinates: Coordinates,
    /// Fully encoded provider URL.
    pub url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Five consecutive daily samples, always complete.
pub struct FiveDayForecast {
    /// First day (the reference date).
    #[serde(rename = "Day1")]
    pub day1: Sample,
    /// Second day.
    #[serde(rename = "Day2")]
    pub day2: Sample,
    /// Third day.
    #[serde(rename = "Day3")]
    pub day3: Sample,
    /// Fourth day.
    #[serde(rename = "Day4")]
    pub day4: Sample,
    /// Fifth day.
    #[serde(rename = "Day5")]
    pub day5: Sample,
}

impl FiveDayForecast {
    /// Build a forecast from samples in day order.
    #[must_use]
    pub fn from_days(days: [Sample; FORECAST_DAYS]) -> Self {
        let [day1, day2, day3, day4, day5] = days;
        Self {
            day1,
            day2,
            day3,
            day4,
            day5,
        }
    }

    /// Samples in day order.
    #[must_use]
    pub fn days(&self) -> [Sample; FORECAST_DAYS] {
        [self.day1, self.day2, self.day3, self.day4, self.day5]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Forecasts of all providers for one request, in registration order.
pub struct AggregateResult {
    entries: Vec<(ProviderKey, FiveDayForecast)>,
}

impl AggregateResult {
    /// Append a provider's forecast.
    pub fn push(&mut self, key: ProviderKey, forecast: FiveDayForecast) {
        self.entries.push((key, forecast));
    }

    /// Forecast published under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FiveDayForecast> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key.0 == key)
            .map(|(_, forecast)| forecast)
    }

    /// Number of providers merged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no provider has been merged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterator over keys and forecasts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProviderKey, &FiveDayForecast)> {
        self.entries.iter().map(|(key, forecast)| (key, forecast))
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, forecast) in self.iter() {
            map.serialize_entry(&key.0, forecast)?;
        }
        map.end()
    }
}
