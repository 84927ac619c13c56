//! Configuration loading from TOML.
//!
//! Every section has defaults, so a missing file still yields a runnable
//! configuration. The WeatherAPI key is never stored in the file; the config
//! only names the environment variable holding it.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "METEOMERGE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Outbound HTTP client settings.
    pub http: HttpConfig,
    /// Per-provider settings.
    pub providers: ProvidersConfig,
}

/// Where the HTTP server listens.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

/// Shared outbound client settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent to providers.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: String::from("meteomerge/0.1"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
/// Settings for each registered provider.
pub struct ProvidersConfig {
    /// Open-Meteo settings.
    pub openmeteo: OpenMeteoConfig,
    /// WeatherAPI settings.
    pub weatherapi: WeatherApiConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
/// Open-Meteo settings.
pub struct OpenMeteoConfig {
    /// Overrides the public API host.
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
/// WeatherAPI settings.
pub struct WeatherApiConfig {
    /// Overrides the public API host.
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for WeatherApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: String::from("WEATHER_API_KEY"),
        }
    }
}

impl AppConfig {
    /// Path from `METEOMERGE_CONFIG`, or `config.toml`.
    #[must_use]
    pub fn path_from_env() -> String {
        env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| String::from(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from a TOML file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read config file: {path}"));
            }
        };
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or mistyped values.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Socket address built from `[server]`.
    ///
    /// # Errors
    ///
    /// Fails when `host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let host = &self.server.host;
        let ip = host
            .parse()
            .with_context(|| format!("Invalid server host: {host}"))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Outbound request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Value of the variable named by `providers.weatherapi.api_key_env`.
    ///
    /// An unset variable yields an empty key, which the WeatherAPI caller rejects.
    #[must_use]
    pub fn weather_api_key(&self) -> String {
        env::var(&self.providers.weatherapi.api_key_env).unwrap_or_default()
    }
}
