//! Virtual-time policies for telemetry generation.
//!
//! Live and historical runs move an asset's virtual hour in deliberately
//! different ways. Each lives in its own [`ClockPolicy`] so the step-and-wrap
//! logic of live runs can never leak into a backfill.

use chrono::{DateTime, Timelike, Utc};

/// Decides an asset's next virtual hour and the timestamp of its reading.
pub trait ClockPolicy {
    /// Returns `(next_virtual_hour, reading_timestamp)` given the asset's
    /// current virtual hour. The returned hour is always in `[0, 24)`.
    fn advance(&self, virtual_hour: f64) -> (f64, DateTime<Utc>);
}

/// Real-time cadence: a fixed virtual step per tick, stamped with wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct LivePolicy {
    pub step_hours: f64,
}

impl Default for LivePolicy {
    fn default() -> Self {
        Self { step_hours: 0.5 }
    }
}

impl LivePolicy {
    pub fn new(step_hours: f64) -> Self {
        Self { step_hours }
    }

    pub fn next_hour(&self, virtual_hour: f64) -> f64 {
        (virtual_hour + self.step_hours).rem_euclid(24.0)
    }
}

impl ClockPolicy for LivePolicy {
    fn advance(&self, virtual_hour: f64) -> (f64, DateTime<Utc>) {
        (self.next_hour(virtual_hour), Utc::now())
    }
}

/// Backfill cadence: the virtual hour is the injected timestamp's time of day.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalPolicy {
    pub timestamp: DateTime<Utc>,
}

impl HistoricalPolicy {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }

    pub fn hour_of_day(&self) -> f64 {
        f64::from(self.timestamp.hour()) + f64::from(self.timestamp.minute()) / 60.0
    }
}

impl ClockPolicy for HistoricalPolicy {
    fn advance(&self, _virtual_hour: f64) -> (f64, DateTime<Utc>) {
        (self.hour_of_day(), self.timestamp)
    }
}
