//! meteomerge server binary.
//!
//! Loads `.env` and the TOML configuration, initialises structured logging,
//! registers the providers, and serves until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use meteomerge_core::{AggregationService, CallerContext, ProviderRegistry, ReqwestTransport};
use meteomerge_provider_openmeteo as openmeteo;
use meteomerge_provider_weatherapi as weatherapi;
use meteomerge_server::config::AppConfig;
use meteomerge_server::logging::init_logging;
use meteomerge_server::routes::{AppState, build_router};
use meteomerge_server::shutdown::shutdown_signal;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenv::dotenv().ok();

    let config_path = AppConfig::path_from_env();
    let config = AppConfig::load(&config_path)?;

    init_logging();
    info!(config = %config_path, "meteomerge starting up");

    let transport = ReqwestTransport::with_settings(config.timeout(), &config.http.user_agent)
        .context("Failed to build HTTP client")?;
    let cancel = CancellationToken::new();
    let context = CallerContext::new(Arc::new(transport)).with_cancellation(cancel.clone());

    // Registration order decides the weatherAPI{n} keys.
    let plugins = vec![
        openmeteo::plugin(context.clone(), config.providers.openmeteo.base_url.as_deref())
            .context("Failed to set up Open-Meteo")?,
        weatherapi::plugin(
            &config.weather_api_key(),
            context,
            config.providers.weatherapi.base_url.as_deref(),
        )
        .with_context(|| {
            format!(
                "Failed to set up WeatherAPI (set {})",
                config.providers.weatherapi.api_key_env
            )
        })?,
    ];
    let registry = Arc::new(ProviderRegistry::new(plugins));
    let service = Arc::new(AggregationService::new(registry));
    for provider in service.providers() {
        info!(id = %provider.id, name = %provider.name, "Provider registered");
    }

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, build_router(AppState::new(service)))
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
