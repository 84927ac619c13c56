//! Fetch-and-assemble pipeline shared by every provider caller.
//!
//! One call plans a request per day, then runs two stages side by side:
//!
//! * the fetch stage requests the days one after another and hands each decoded
//!   [`Sample`] over a single bounded channel, tagged with its plan index;
//! * the assemble stage drains that channel into a [`FiveDayForecast`].
//!
//! The fetch stage owns the only sender. It is dropped on every exit path, which
//! closes the channel and is the only completion signal the assemble stage gets.
//! The supervisor in [`run`] waits for both stages and reports the fetch error
//! first, since a short assembly is only ever a consequence of it.

use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::SystemClock;
use crate::model::{Coordinates, FORECAST_DAYS, FiveDayForecast, RequestDescriptor, Sample};
use crate::ports::{Clock, DailyEndpoint, DecodeError, HttpTransport, PortError, redact};

/// A sample on its way to the assembler, tagged with the descriptor it answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delivery {
    /// Position of the originating descriptor in the plan.
    pub index: usize,
    /// Decoded sample.
    pub sample: Sample,
}

/// Outcome of the assemble stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assembly {
    /// Every slot was filled exactly once.
    Complete(FiveDayForecast),
    /// The channel closed before every slot was filled, or a slot was hit twice.
    Incomplete {
        /// Deliveries that reached the assembler.
        received: usize,
    },
}

impl Assembly {
    /// Convert into the caller-facing result.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::IncompleteForecast`] for [`Assembly::Incomplete`].
    pub fn into_result(self) -> Result<FiveDayForecast, PortError> {
        match self {
            Assembly::Complete(forecast) => Ok(forecast),
            Assembly::Incomplete { received } => Err(PortError::IncompleteForecast {
                received,
                expected: FORECAST_DAYS,
            }),
        }
    }
}

/// Plan `count` requests for consecutive days starting at `reference`.
///
/// # Errors
///
/// Returns [`PortError::InvalidUrl`] when the endpoint cannot encode a request.
pub fn plan(
    endpoint: &dyn DailyEndpoint,
    reference: NaiveDate,
    count: usize,
    coordinates: Coordinates,
) -> Result<Vec<RequestDescriptor>, PortError> {
    reference
        .iter_days()
        .take(count)
        .enumerate()
        .map(|(index, date)| {
            Ok(RequestDescriptor {
                index,
                date,
                coordinates,
                url: endpoint.daily_url(date, coordinates)?,
            })
        })
        .collect()
}

/// Request every descriptor in order and send one delivery per success.
///
/// The first failure ends the loop. `sender` is consumed so the channel closes
/// however this function returns.
///
/// # Errors
///
/// Returns the [`PortError`] of the first failing request, or
/// [`PortError::Cancelled`] when `cancel` fired before a request was issued.
pub async fn fetch_stage(
    transport: &dyn HttpTransport,
    endpoint: &dyn DailyEndpoint,
    descriptors: &[RequestDescriptor],
    cancel: &CancellationToken,
    sender: mpsc::Sender<Delivery>,
) -> Result<(), PortError> {
    for descriptor in descriptors {
        if cancel.is_cancelled() {
            return Err(PortError::Cancelled);
        }

        let shown = redact(&descriptor.url);
        debug!(url = %shown, date = %descriptor.date, "Requesting daily forecast");

        let response = transport
            .get(&descriptor.url)
            .await
            .map_err(|source| PortError::Transport {
                url: shown.clone(),
                source,
            })?;

        if response.status != StatusCode::OK {
            return Err(PortError::UnexpectedStatus {
                url: shown,
                status: response.status,
            });
        }

        let sample = endpoint
            .first_sample(&response.body)
            .map_err(|source| PortError::DecodePayload {
                url: shown.clone(),
                source,
            })?;

        if sample.date != descriptor.date {
            warn!(
                url = %shown,
                planned = %descriptor.date,
                answered = %sample.date,
                "Provider answered for a different day"
            );
            return Err(PortError::DecodePayload {
                url: shown,
                source: DecodeError::DateMismatch {
                    planned: descriptor.date,
                    answered: sample.date,
                },
            });
        }

        let delivery = Delivery {
            index: descriptor.index,
            sample,
        };
        if sender.send(delivery).await.is_err() {
            // receiver gone, the assembler already settled its outcome
            break;
        }
    }

    Ok(())
}

/// Drain `receiver` until it closes and place each delivery by its index.
pub async fn assemble_stage(mut receiver: mpsc::Receiver<Delivery>) -> Assembly {
    let mut slots: [Option<Sample>; FORECAST_DAYS] = [None; FORECAST_DAYS];
    let mut received = 0_usize;
    let mut misplaced = false;

    // keep draining after a bad index so the producer never blocks on a full channel
    while let Some(Delivery { index, sample }) = receiver.recv().await {
        received = received.saturating_add(1);
        match slots.get_mut(index) {
            Some(slot @ None) => *slot = Some(sample),
            _ => misplaced = true,
        }
    }

    match slots {
        [Some(day1), Some(day2), Some(day3), Some(day4), Some(day5)] if !misplaced => {
            Assembly::Complete(FiveDayForecast::from_days([day1, day2, day3, day4, day5]))
        }
        _ => Assembly::Incomplete { received },
    }
}

/// Run both stages for one provider call and join them.
///
/// # Errors
///
/// Returns the fetch stage's error if it failed, otherwise the assembler's.
pub async fn run(
    transport: &dyn HttpTransport,
    endpoint: &dyn DailyEndpoint,
    reference: NaiveDate,
    coordinates: Coordinates,
    cancel: &CancellationToken,
) -> Result<FiveDayForecast, PortError> {
    let descriptors = plan(endpoint, reference, FORECAST_DAYS, coordinates)?;
    let (sender, receiver) = mpsc::channel(1);

    let (fetched, assembled) = tokio::join!(
        fetch_stage(transport, endpoint, &descriptors, cancel, sender),
        assemble_stage(receiver),
    );

    fetched?;
    assembled.into_result()
}

/// Collaborators every provider caller is constructed with.
#[derive(Clone)]
pub struct CallerContext {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl CallerContext {
    /// Context using the system clock and a token nobody cancels.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the clock deciding the first forecast day.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the token checked before each request.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the pipeline for `endpoint` starting today.
    ///
    /// # Errors
    ///
    /// See [`run`].
    pub async fn five_days(
        &self,
        endpoint: &dyn DailyEndpoint,
        coordinates: Coordinates,
    ) -> Result<FiveDayForecast, PortError> {
        run(
            self.transport.as_ref(),
            endpoint,
            self.clock.today(),
            coordinates,
            &self.cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use reqwest::Url;

    use super::*;
    use crate::clock::FixedClock;
    use crate::ports::{BoxError, HttpResponse};
    use crate::testing::ScriptedTransport;

    /// Endpoint answering `{"date": "...", "max": 1.0}` bodies.
    struct PlainEndpoint;

    #[derive(serde::Deserialize)]
    struct PlainBody {
        date: String,
        max: f64,
    }

    impl DailyEndpoint for PlainEndpoint {
        fn daily_url(&self, date: NaiveDate, coordinates: Coordinates) -> Result<Url, PortError> {
            let raw = format!(
                "https://plain.test/day?lat={:.6}&lon={:.6}&date={date}",
                coordinates.lat, coordinates.lon
            );
            Url::parse(&raw).map_err(|err| PortError::InvalidUrl(err.to_string()))
        }

        fn first_sample(&self, body: &[u8]) -> Result<Sample, DecodeError> {
            let parsed: PlainBody = serde_json::from_slice(body)?;
            let date = NaiveDate::parse_from_str(&parsed.date, "%Y-%m-%d")?;
            Ok(Sample::new(date, parsed.max))
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid test date")
    }

    fn here() -> Coordinates {
        Coordinates::new(42.649_393_4, -8.820_175_3).expect("valid coordinates")
    }

    fn body(day: &str, max: f64) -> String {
        format!(r#"{{"date":"{day}","max":{max}}}"#)
    }

    const DAYS: [(&str, f64); FORECAST_DAYS] = [
        ("2024-11-05", 21.9),
        ("2024-11-06", 21.0),
        ("2024-11-07", 22.6),
        ("2024-11-08", 18.3),
        ("2024-11-09", 18.2),
    ];

    fn scripted_week() -> ScriptedTransport {
        DAYS.iter().fold(ScriptedTransport::new(), |transport, (day, max)| {
            transport.reply(StatusCode::OK, body(day, *max))
        })
    }

    #[test]
    fn plan_yields_consecutive_days_in_order() {
        let reference = date("2024-12-30");
        let plan = plan(&PlainEndpoint, reference, FORECAST_DAYS, here()).expect("plan");

        let dates: Vec<NaiveDate> = plan.iter().map(|descriptor| descriptor.date).collect();
        assert_eq!(
            dates,
            vec![
                date("2024-12-30"),
                date("2024-12-31"),
                date("2025-01-01"),
                date("2025-01-02"),
                date("2025-01-03"),
            ]
        );
        let indices: Vec<usize> = plan.iter().map(|descriptor| descriptor.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        let first = plan.first().expect("non-empty plan");
        assert!(first.url.as_str().contains("date=2024-12-30"), "{}", first.url);
    }

    #[test]
    fn plan_with_zero_days_is_empty() {
        let plan = plan(&PlainEndpoint, date("2024-11-05"), 0, here()).expect("plan");
        assert!(plan.is_empty(), "nothing to request");
    }

    #[tokio::test]
    async fn assemble_keeps_arrival_order_of_a_sequential_producer() {
        let (sender, receiver) = mpsc::channel(1);
        let producer = async move {
            for (index, (day, max)) in DAYS.iter().enumerate() {
                let sample = Sample::new(date(day), *max);
                sender.send(Delivery { index, sample }).await.expect("receiver alive");
            }
        };

        let ((), assembly) = tokio::join!(producer, assemble_stage(receiver));

        let Assembly::Complete(forecast) = assembly else {
            panic!("expected a complete forecast, got {assembly:?}");
        };
        let expected: Vec<Sample> = DAYS
            .iter()
            .map(|(day, max)| Sample::new(date(day), *max))
            .collect();
        assert_eq!(forecast.days().to_vec(), expected);
    }

    #[tokio::test]
    async fn assemble_places_by_index_not_by_arrival() {
        let (sender, receiver) = mpsc::channel(FORECAST_DAYS);
        for index in [4_usize, 2, 0, 3, 1] {
            let (day, max) = DAYS.get(index).copied().expect("index in range");
            sender
                .send(Delivery {
                    index,
                    sample: Sample::new(date(day), max),
                })
                .await
                .expect("receiver alive");
        }
        drop(sender);

        let forecast = assemble_stage(receiver).await.into_result().expect("complete");
        assert_eq!(forecast.day1.date, date("2024-11-05"));
        assert_eq!(forecast.day5.date, date("2024-11-09"));
    }

    #[tokio::test]
    async fn assemble_reports_short_sequences_without_building_a_forecast() {
        let (sender, receiver) = mpsc::channel(FORECAST_DAYS);
        for (index, (day, max)) in DAYS.iter().take(2).enumerate() {
            sender
                .send(Delivery {
                    index,
                    sample: Sample::new(date(day), *max),
                })
                .await
                .expect("receiver alive");
        }
        drop(sender);

        assert_eq!(assemble_stage(receiver).await, Assembly::Incomplete { received: 2 });
    }

    #[tokio::test]
    async fn assemble_rejects_duplicate_slots() {
        let (sender, receiver) = mpsc::channel(FORECAST_DAYS + 1);
        for index in [0_usize, 1, 2, 3, 4, 4] {
            let (day, max) = DAYS.get(index).copied().expect("index in range");
            sender
                .send(Delivery {
                    index,
                    sample: Sample::new(date(day), max),
                })
                .await
                .expect("receiver alive");
        }
        drop(sender);

        assert_eq!(assemble_stage(receiver).await, Assembly::Incomplete { received: 6 });
    }

    #[tokio::test]
    async fn run_assembles_five_days_in_plan_order() {
        let transport = scripted_week();
        let cancel = CancellationToken::new();

        let forecast = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel)
            .await
            .expect("forecast");

        assert_eq!(forecast.day1, Sample::new(date("2024-11-05"), 21.9));
        assert_eq!(forecast.day2, Sample::new(date("2024-11-06"), 21.0));
        assert_eq!(forecast.day3, Sample::new(date("2024-11-07"), 22.6));
        assert_eq!(forecast.day4, Sample::new(date("2024-11-08"), 18.3));
        assert_eq!(forecast.day5, Sample::new(date("2024-11-09"), 18.2));
        assert_eq!(transport.calls(), FORECAST_DAYS);
    }

    #[tokio::test]
    async fn run_surfaces_the_originating_error_after_partial_delivery() {
        let transport = DAYS
            .iter()
            .take(3)
            .fold(ScriptedTransport::new(), |transport, (day, max)| {
                transport.reply(StatusCode::OK, body(day, *max))
            })
            .reply(StatusCode::SERVICE_UNAVAILABLE, "");
        let cancel = CancellationToken::new();

        let result = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel).await;

        match result {
            Err(PortError::UnexpectedStatus { url, status }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert!(url.contains("date=2024-11-08"), "{url}");
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
        assert_eq!(transport.calls(), 4, "no request after the failure");
    }

    #[tokio::test]
    async fn run_maps_transport_failures() {
        let transport = ScriptedTransport::new().fail("connection refused");
        let cancel = CancellationToken::new();

        let result = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel).await;

        assert!(matches!(result, Err(PortError::Transport { .. })), "{result:?}");
    }

    #[tokio::test]
    async fn run_maps_malformed_payloads() {
        let transport = ScriptedTransport::new().reply(StatusCode::OK, "{not json");
        let cancel = CancellationToken::new();

        let result = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel).await;

        assert!(
            matches!(
                result,
                Err(PortError::DecodePayload {
                    source: DecodeError::Json(_),
                    ..
                })
            ),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn run_stops_before_the_first_request_when_cancelled() {
        let transport = scripted_week();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel).await;

        assert!(matches!(result, Err(PortError::Cancelled)), "{result:?}");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn context_starts_at_the_injected_date() {
        let transport = Arc::new(scripted_week());
        let context = CallerContext::new(Arc::<ScriptedTransport>::clone(&transport))
            .with_clock(Arc::new(FixedClock(date("2024-11-05"))));

        let forecast = context.five_days(&PlainEndpoint, here()).await.expect("forecast");

        assert_eq!(forecast.day1.date, date("2024-11-05"));
        let requested = transport.requested();
        let last = requested.last().expect("five requests");
        assert!(last.as_str().contains("date=2024-11-09"), "{last}");
    }

    /// Scripted transport that cancels `cancel` while serving request number `cancel_on`.
    struct CancellingTransport {
        inner: ScriptedTransport,
        cancel: CancellationToken,
        cancel_on: usize,
    }

    #[async_trait]
    impl HttpTransport for CancellingTransport {
        async fn get(&self, url: &Url) -> Result<HttpResponse, BoxError> {
            let response = self.inner.get(url).await;
            if self.inner.calls() == self.cancel_on {
                self.cancel.cancel();
            }
            response
        }
    }

    #[tokio::test]
    async fn run_stops_at_the_next_iteration_when_cancelled_mid_loop() {
        let cancel = CancellationToken::new();
        let transport = CancellingTransport {
            inner: scripted_week(),
            cancel: cancel.clone(),
            cancel_on: 2,
        };

        let result = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel).await;

        assert!(matches!(result, Err(PortError::Cancelled)), "{result:?}");
        assert_eq!(transport.inner.calls(), 2, "no request after cancellation");
    }

    #[tokio::test]
    async fn run_rejects_answers_for_a_different_day() {
        let transport = ScriptedTransport::new()
            .reply(StatusCode::OK, body("2024-11-05", 1.0))
            .reply(StatusCode::OK, body("2024-11-05", 1.0));
        let cancel = CancellationToken::new();

        let result = run(&transport, &PlainEndpoint, date("2024-11-05"), here(), &cancel).await;

        match result {
            Err(PortError::DecodePayload {
                url,
                source: DecodeError::DateMismatch { planned, answered },
            }) => {
                assert_eq!(planned, date("2024-11-06"));
                assert_eq!(answered, date("2024-11-05"));
                assert!(url.contains("date=2024-11-06"), "{url}");
            }
            other => panic!("expected a date mismatch, got {other:?}"),
        }
        assert_eq!(transport.calls(), 2, "no request after the mismatch");
    }
}
