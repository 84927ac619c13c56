//! HTTP routes: the aggregation endpoint, request metrics, and a health check.

use std::num::ParseFloatError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use meteomerge_core::{
    AggregateResult, AggregationService, CoordinateError, Coordinates, ServiceError,
};

/// Body for requests without usable `lat`/`lon`.
pub const MISSING_PARAMETERS: &str =
    "Missing request parameter(s).\nPlease provide valid 'lat' and 'lon' in the URL.";
/// Body for coordinates outside the globe.
pub const PARAMETERS_OUT_OF_BOUNDS: &str =
    "Parameters out of bounds.\nlat must be within -90 and 90, lon must be within -180 and 180.";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Aggregation across all registered providers.
    pub service: Arc<AggregationService>,
    /// Counters behind `/debug/vars`.
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// State with fresh metrics.
    #[must_use]
    pub fn new(service: Arc<AggregationService>) -> Self {
        Self {
            service,
            metrics: Arc::new(Metrics::default()),
        }
    }
}

/// Request counters for the aggregation endpoint.
#[derive(Debug)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    duration_min_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            duration_min_ms: AtomicU64::new(u64::MAX),
            duration_max_ms: AtomicU64::new(0),
        }
    }
}

impl Metrics {
    /// Record one finished request.
    pub fn record(&self, elapsed_ms: u64, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.duration_min_ms.fetch_min(elapsed_ms, Ordering::Relaxed);
        self.duration_max_ms.fetch_max(elapsed_ms, Ordering::Relaxed);
    }

    /// Current values; durations are `None` until the first request finished.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests_sum = self.requests.load(Ordering::Relaxed);
        let seen = requests_sum > 0;
        MetricsSnapshot {
            requests_sum,
            errors_sum: self.errors.load(Ordering::Relaxed),
            duration_min_ms: seen.then(|| self.duration_min_ms.load(Ordering::Relaxed)),
            duration_max_ms: seen.then(|| self.duration_max_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Body of `GET /debug/vars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests handled by `/weather`.
    pub requests_sum: u64,
    /// Requests answered with a 4xx or 5xx status.
    pub errors_sum: u64,
    /// Fastest request.
    pub duration_min_ms: Option<u64>,
    /// Slowest request.
    pub duration_max_ms: Option<u64>,
}

/// Raw query of `GET /weather`; validation happens in the handler.
#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    lat: Option<String>,
    lon: Option<String>,
}

/// Failures of `GET /weather`, each mapped to a status and a plain-text body.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// `lat` or `lon` absent or empty.
    #[error("{}", MISSING_PARAMETERS)]
    MissingParameters,
    /// A parameter is not a floating point number.
    #[error("parse {name} parameter {value:?} into float: {source}")]
    InvalidNumber {
        /// `latitude` or `longitude`.
        name: &'static str,
        /// Raw parameter text.
        value: String,
        /// Parser complaint.
        #[source]
        source: ParseFloatError,
    },
    /// Coordinates outside the valid ranges.
    #[error("{}", PARAMETERS_OUT_OF_BOUNDS)]
    OutOfBounds(#[source] CoordinateError),
    /// A provider failed.
    #[error(transparent)]
    Upstream(#[from] ServiceError),
}

impl ApiError {
    /// Status code the error is answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameters
            | ApiError::InvalidNumber { .. }
            | ApiError::OutOfBounds(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Weather request failed");
        } else {
            warn!(error = %self, "Weather request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

impl WeatherQuery {
    /// Validate both parameters into coordinates.
    ///
    /// # Errors
    ///
    /// See [`ApiError`]; `Upstream` is never produced here.
    pub fn coordinates(&self) -> Result<Coordinates, ApiError> {
        let (Some(lat), Some(lon)) = (
            non_empty(self.lat.as_deref()),
            non_empty(self.lon.as_deref()),
        ) else {
            return Err(ApiError::MissingParameters);
        };
        let lat = parse_number("latitude", lat)?;
        let lon = parse_number("longitude", lon)?;
        Coordinates::new(lat, lon).map_err(ApiError::OutOfBounds)
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.filter(|value| !value.is_empty())
}

fn parse_number(name: &'static str, raw: &str) -> Result<f64, ApiError> {
    raw.parse().map_err(|source| ApiError::InvalidNumber {
        name,
        value: raw.to_owned(),
        source,
    })
}

/// GET /weather?lat=..&lon=..
pub async fn weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<AggregateResult>, ApiError> {
    let coordinates = query.coordinates()?;
    info!(lat = coordinates.lat, lon = coordinates.lon, "Aggregating forecasts");
    let result = state.service.aggregate(coordinates).await?;
    Ok(Json(result))
}

/// GET /debug/vars
pub async fn debug_vars(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

async fn track_metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = response.status();
    metrics.record(elapsed_ms, status.is_client_error() || status.is_server_error());
    response
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let metered = Router::new()
        .route("/weather", get(weather))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.metrics),
            track_metrics,
        ));

    Router::new()
        .merge(metered)
        .route("/debug/vars", get(debug_vars))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use chrono::NaiveDate;
    use meteomerge_core::testing::StubPort;
    use meteomerge_core::{FiveDayForecast, ProviderPlugin, ProviderRegistry, Sample};
    use tower::ServiceExt;

    use super::*;

    fn forecast(first_max: f64) -> FiveDayForecast {
        let mut days = NaiveDate::from_ymd_opt(2024, 11, 5).expect("valid date").iter_days();
        let mut next =
            |offset: f64| Sample::new(days.next().expect("dates left"), first_max + offset);
        FiveDayForecast::from_days([next(0.0), next(1.0), next(2.0), next(3.0), next(4.0)])
    }

    fn state_with(ports: Vec<StubPort>) -> AppState {
        let plugins = ports
            .into_iter()
            .map(|port| ProviderPlugin::from_port(Arc::new(port)))
            .collect();
        AppState::new(Arc::new(AggregationService::new(Arc::new(ProviderRegistry::new(plugins)))))
    }

    fn healthy_state() -> AppState {
        state_with(vec![
            StubPort::succeeding("openmeteo", forecast(21.9)),
            StubPort::succeeding("weatherapi", forecast(19.8)),
        ])
    }

    async fn get_path(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("infallible router");
        let status = response.status();
        let body = to_bytes(response.into_body(), 100_000).await.expect("body");
        (status, String::from_utf8(body.to_vec()).expect("utf-8 body"))
    }

    #[tokio::test]
    async fn missing_parameters_yield_bad_request_with_exact_message() {
        for uri in [
            "/weather",
            "/weather?lat=42.6",
            "/weather?lon=-8.8",
            "/weather?lat=&lon=-8.8",
        ] {
            let (status, body) = get_path(build_router(healthy_state()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body, MISSING_PARAMETERS, "{uri}");
        }
    }

    #[tokio::test]
    async fn out_of_bounds_coordinates_yield_bad_request() {
        for uri in ["/weather?lat=90.1&lon=0", "/weather?lat=0&lon=-180.5"] {
            let (status, body) = get_path(build_router(healthy_state()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body, PARAMETERS_OUT_OF_BOUNDS, "{uri}");
        }
    }

    #[tokio::test]
    async fn unparsable_numbers_name_the_parameter() {
        let (status, body) =
            get_path(build_router(healthy_state()), "/weather?lat=north&lon=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(body.contains("latitude"), "{body}");
    }

    #[tokio::test]
    async fn successful_aggregation_returns_keyed_json() {
        let (status, body) =
            get_path(build_router(healthy_state()), "/weather?lat=42.6493934&lon=-8.8201753").await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let json: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(json["weatherAPI1"]["Day1"]["date"], "2024-11-05");
        assert_eq!(json["weatherAPI1"]["Day1"]["maxTemp"], 21.9);
        assert_eq!(json["weatherAPI2"]["Day5"]["date"], "2024-11-09");
    }

    #[tokio::test]
    async fn provider_failure_yields_bad_gateway() {
        let state = state_with(vec![
            StubPort::failing("openmeteo", StatusCode::SERVICE_UNAVAILABLE),
            StubPort::succeeding("weatherapi", forecast(19.8)),
        ]);
        let (status, body) = get_path(build_router(state), "/weather?lat=1&lon=1").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
        assert!(body.contains("weatherAPI1"), "{body}");
    }

    #[tokio::test]
    async fn debug_vars_count_requests_and_errors() {
        let state = healthy_state();

        let (fresh_status, fresh) = get_path(build_router(state.clone()), "/debug/vars").await;
        assert_eq!(fresh_status, StatusCode::OK);
        let fresh: MetricsSnapshot = serde_json::from_str(&fresh).expect("json body");
        assert_eq!(fresh.requests_sum, 0);
        assert_eq!(fresh.duration_min_ms, None);

        get_path(build_router(state.clone()), "/weather?lat=1&lon=1").await;
        get_path(build_router(state.clone()), "/weather").await;

        let (_, body) = get_path(build_router(state), "/debug/vars").await;
        let snapshot: MetricsSnapshot = serde_json::from_str(&body).expect("json body");
        assert_eq!(snapshot.requests_sum, 2);
        assert_eq!(snapshot.errors_sum, 1);
        assert!(snapshot.duration_min_ms <= snapshot.duration_max_ms, "{snapshot:?}");
    }

    #[tokio::test]
    async fn health_and_unknown_routes() {
        let (status, body) = get_path(build_router(healthy_state()), "/health").await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

        let (status, _) = get_path(build_router(healthy_state()), "/forecast").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
