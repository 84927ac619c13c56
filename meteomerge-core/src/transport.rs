//! `reqwest`-backed implementation of [`HttpTransport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{trace, warn};

use crate::ports::{BoxError, HttpResponse, HttpTransport, redact};

/// Production transport wrapping a shared [`Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wrap an already configured client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with a request timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns the [`reqwest::Error`] raised when the TLS backend cannot be initialised.
    pub fn with_settings(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, BoxError> {
        let response = self.client.get(url.clone()).send().await.map_err(|err| {
            warn!(
                url = %redact(url),
                is_connect = err.is_connect(),
                is_timeout = err.is_timeout(),
                "HTTP request failed"
            );
            err.without_url()
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(reqwest::Error::without_url)?;
        trace!(
            url = %redact(url),
            status = status.as_u16(),
            bytes = body.len(),
            "HTTP response read"
        );

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
