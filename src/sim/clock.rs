use chrono::{DateTime, Duration, Utc};

/// A synthetic clock that walks a bounded window of past timestamps.
///
/// Timestamps are computed as `start + step * n`, so they never drift no
/// matter how many steps are taken. Both window boundaries are included.
///
/// # Examples
///
/// ```
/// use asset_twin::sim::clock::BackfillClock;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
/// let mut clock = BackfillClock::ending_at(end, Duration::days(1), Duration::hours(1));
/// let mut stamps = Vec::new();
///
/// clock.run(|_, ts| stamps.push(ts));
/// assert_eq!(stamps.len(), 25);
/// assert_eq!(stamps.last(), Some(&end));
/// ```
pub struct BackfillClock {
    start: DateTime<Utc>,
    step: Duration,
    /// Index of the next step to emit
    current: u64,
    /// Total steps in the window
    total: u64,
}

impl BackfillClock {
    /// Creates a clock covering `[end - window, end]` in increments of `step`.
    ///
    /// # Panics
    ///
    /// Panics if `step` is shorter than one millisecond or `window` is negative.
    pub fn ending_at(end: DateTime<Utc>, window: Duration, step: Duration) -> Self {
        assert!(step.num_milliseconds() >= 1, "step must be at least one millisecond");
        assert!(window >= Duration::zero(), "window must not be negative");
        let total = window.num_milliseconds() / step.num_milliseconds() + 1;
        Self {
            start: end - window,
            step,
            current: 0,
            total: total as u64,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Total number of steps, boundaries included.
    pub fn total_steps(&self) -> u64 {
        self.total
    }

    /// Timestamp of step `n`, or `None` if it is not representable.
    pub fn timestamp_at(&self, n: u64) -> Option<DateTime<Utc>> {
        let offset = self.step.checked_mul(i32::try_from(n).ok()?)?;
        self.start.checked_add_signed(offset)
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some((step, timestamp))` - The step index and its timestamp
    /// * `None` - If the window is exhausted or the next timestamp overflows
    pub fn tick(&mut self) -> Option<(u64, DateTime<Utc>)> {
        if self.current >= self.total {
            return None;
        }
        let step = self.current;
        let timestamp = self.timestamp_at(step)?;
        self.current += 1;
        Some((step, timestamp))
    }

    /// Runs a function for each remaining step.
    pub fn run(&mut self, mut f: impl FnMut(u64, DateTime<Utc>)) {
        while let Some((step, ts)) = self.tick() {
            f(step, ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn thirty_day_hourly_window_is_inclusive() {
        let clock = BackfillClock::ending_at(end(), Duration::days(30), Duration::hours(1));
        assert_eq!(clock.total_steps(), 30 * 24 + 1);
        assert_eq!(clock.start(), end() - Duration::days(30));
    }

    #[test]
    fn tick_walks_exact_steps() {
        let mut clock = BackfillClock::ending_at(end(), Duration::hours(2), Duration::hours(1));
        assert_eq!(clock.tick(), Some((0, end() - Duration::hours(2))));
        assert_eq!(clock.tick(), Some((1, end() - Duration::hours(1))));
        assert_eq!(clock.tick(), Some((2, end())));
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn last_step_lands_on_end_without_drift() {
        let clock = BackfillClock::ending_at(end(), Duration::days(30), Duration::minutes(15));
        assert_eq!(clock.timestamp_at(clock.total_steps() - 1), Some(end()));
    }

    #[test]
    fn unrepresentable_steps_have_no_timestamp() {
        let clock = BackfillClock::ending_at(end(), Duration::days(1), Duration::hours(1));
        assert_eq!(clock.timestamp_at(u64::from(u32::MAX)), None);

        let wide = BackfillClock::ending_at(end(), Duration::zero(), Duration::days(365_000));
        assert_eq!(wide.timestamp_at(1_000), None);
    }

    #[test]
    #[should_panic(expected = "at least one millisecond")]
    fn sub_millisecond_step_panics() {
        BackfillClock::ending_at(end(), Duration::days(1), Duration::microseconds(500));
    }

    #[test]
    fn empty_window_yields_single_step() {
        let mut clock = BackfillClock::ending_at(end(), Duration::zero(), Duration::hours(1));
        let mut seen = Vec::new();
        clock.run(|n, ts| seen.push((n, ts)));
        assert_eq!(seen, vec![(0, end())]);
    }
}
