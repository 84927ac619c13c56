//! Traits describing provider capabilities, injected collaborators, and shared error types.

use std::error::Error as StdError;

use async_trait::async_trait;
use chrono::{NaiveDate, ParseError as ChronoParseError};
use reqwest::{StatusCode, Url};
use serde_json::Error as JsonError;

use crate::model::{Coordinates, FiveDayForecast, ProviderMeta, Sample};

/// Boxed error returned by transports.
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while fetching and assembling a provider forecast.
pub enum PortError {
    /// The provider needs a credential and none was configured.
    #[error("API key missing for {provider}")]
    MissingCredential {
        /// Provider that rejected construction.
        provider: String,
    },
    /// Network layer failed before a response arrived.
    #[error("GET {url} failed: {source}")]
    Transport {
        /// Requested URL with secrets redacted.
        url: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },
    /// Provider answered with something other than 200 OK.
    #[error("GET {url} unexpected status, want {}, got {status}", StatusCode::OK)]
    UnexpectedStatus {
        /// Requested URL with secrets redacted.
        url: String,
        /// Status the provider returned.
        status: StatusCode,
    },
    /// Response body could not be turned into a sample.
    #[error("Decoding response data from {url} failed: {source}")]
    DecodePayload {
        /// Requested URL with secrets redacted.
        url: String,
        /// What went wrong while decoding.
        #[source]
        source: DecodeError,
    },
    /// Cancellation was requested before the next request.
    #[error("Fetching was cancelled")]
    Cancelled,
    /// Fewer samples arrived than were planned.
    #[error("Assembled {received} of {expected} daily samples")]
    IncompleteForecast {
        /// Samples that reached the assembler.
        received: usize,
        /// Samples the plan asked for.
        expected: usize,
    },
    /// Provider URL could not be built.
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

#[derive(thiserror::Error, Debug)]
/// Reasons a provider payload can be rejected.
pub enum DecodeError {
    /// Body was not the expected JSON envelope.
    #[error("malformed JSON: {0}")]
    Json(#[from] JsonError),
    /// Envelope decoded but carried no daily entry.
    #[error("payload holds no daily entry")]
    Empty,
    /// Date field was not `YYYY-MM-DD`.
    #[error("unparsable date: {0}")]
    Date(#[from] ChronoParseError),
    /// Entry belongs to another day than the one requested.
    #[error("answered for {answered}, requested {planned}")]
    DateMismatch {
        /// Day the request asked for.
        planned: NaiveDate,
        /// Day the payload carried.
        answered: NaiveDate,
    },
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
/// Rejected coordinates.
pub enum CoordinateError {
    /// Latitude or longitude outside the globe.
    #[error("lat or lon out of bounds: lat {lat}, lon {lon}")]
    OutOfBounds {
        /// Rejected latitude.
        lat: f64,
        /// Rejected longitude.
        lon: f64,
    },
}

#[derive(Debug, Clone)]
/// Status and body of a completed HTTP exchange.
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Construct a response.
    #[must_use]
    pub fn new<B: Into<Vec<u8>>>(status: StatusCode, body: B) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[async_trait]
/// HTTP seam used by the fetch stage.
///
/// Implementations must be safe to share between concurrent requests.
pub trait HttpTransport: Send + Sync {
    /// Perform a GET and return status and body.
    ///
    /// Non-200 statuses are not errors at this level.
    ///
    /// # Errors
    ///
    /// Returns a [`BoxError`] when no response could be obtained.
    async fn get(&self, url: &Url) -> Result<HttpResponse, BoxError>;
}

/// Source of "today".
pub trait Clock: Send + Sync {
    /// Current calendar date.
    fn today(&self) -> NaiveDate;
}

/// Provider-specific request encoding and payload decoding for one day.
pub trait DailyEndpoint: Send + Sync {
    /// Encode the request for `date` at `coordinates`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidUrl`] when the URL cannot be built.
    fn daily_url(&self, date: NaiveDate, coordinates: Coordinates) -> Result<Url, PortError>;

    /// Extract the first `(date, max temperature)` pair from a response body.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed or empty payloads.
    fn first_sample(&self, body: &[u8]) -> Result<Sample, DecodeError>;
}

#[async_trait]
/// Capability every provider caller offers to the aggregation service.
pub trait ForecastPort: Send + Sync {
    /// Metadata describing the provider behind this port.
    fn provider(&self) -> &ProviderMeta;

    /// Fetch five consecutive daily maxima starting today.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when any request fails; no partial forecast is produced.
    async fn aggregate_weather(
        &self,
        coordinates: Coordinates,
    ) -> Result<FiveDayForecast, PortError>;
}

/// Render `url` for logs and errors with the `key` query parameter masked.
#[must_use]
pub fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(name, _)| name == "key") {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let shown = if name == "key" {
                String::from("***")
            } else {
                value.into_owned()
            };
            (name.into_owned(), shown)
        })
        .collect();

    let mut masked = url.clone();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
