//! Clock implementations used to decide which day a forecast starts on.

use chrono::{NaiveDate, Utc};

use crate::ports::Clock;

#[derive(Debug, Clone, Copy, Default)]
/// Wall clock in UTC.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
/// Clock pinned to a single date, for tests and reproducible runs.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
