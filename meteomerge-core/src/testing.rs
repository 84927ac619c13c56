//! Test doubles for the transport and provider seams.
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! downstream crates.

use std::collections::VecDeque;
use std::io::{Error as IoError, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::model::{Coordinates, FiveDayForecast, ProviderId, ProviderMeta};
use crate::ports::{BoxError, ForecastPort, HttpResponse, HttpTransport, PortError};

enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

/// Transport replaying a fixed script of replies and counting requests.
///
/// Once the script is exhausted every further request fails.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requested: Mutex<Vec<Url>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    /// Transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn reply<B: Into<Vec<u8>>>(mut self, status: StatusCode, body: B) -> Self {
        self.script
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Scripted::Respond(HttpResponse::new(status, body)));
        self
    }

    /// Queue a connection-level failure.
    #[must_use]
    pub fn fail(mut self, message: &str) -> Self {
        self.script
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Scripted::Fail(message.to_owned()));
        self
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn requested(&self) -> Vec<Url> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(Box::new(IoError::new(
                ErrorKind::ConnectionRefused,
                message,
            ))),
            None => Err(Box::new(IoError::other(format!("no scripted reply left for {url}")))),
        }
    }
}

/// Provider port returning a canned outcome and counting calls.
pub struct StubPort {
    meta: ProviderMeta,
    outcome: Result<FiveDayForecast, StatusCode>,
    calls: AtomicUsize,
}

impl StubPort {
    /// Port that always answers with `forecast`.
    #[must_use]
    pub fn succeeding(id: &str, forecast: FiveDayForecast) -> Self {
        Self::with_outcome(id, Ok(forecast))
    }

    /// Port that always fails with [`PortError::UnexpectedStatus`] carrying `status`.
    #[must_use]
    pub fn failing(id: &str, status: StatusCode) -> Self {
        Self::with_outcome(id, Err(status))
    }

    fn with_outcome(id: &str, outcome: Result<FiveDayForecast, StatusCode>) -> Self {
        Self {
            meta: ProviderMeta {
                id: ProviderId(id.to_owned()),
                name: format!("Stub {id}"),
            },
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `aggregate_weather` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastPort for StubPort {
    fn provider(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn aggregate_weather(
        &self,
        _coordinates: Coordinates,
    ) -> Result<FiveDayForecast, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.map_err(|status| PortError::UnexpectedStatus {
            url: format!("https://{}.stub/forecast", self.meta.id),
            status,
        })
    }
}
