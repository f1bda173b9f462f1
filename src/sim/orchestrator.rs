//! Drives the fleet through a live or backfill run and publishes every reading.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::BackfillClock;
use super::fleet::FleetRegistry;
use super::generator::TelemetryGenerator;
use super::policy::{HistoricalPolicy, LivePolicy};
use crate::devices::RandomSource;
use crate::error::SimError;
use crate::publish::{Delivery, Publisher};

/// Which loop a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Unbounded real-time loop.
    Live,
    /// Bounded backfill over a past window.
    History,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Live => f.write_str("live"),
            RunMode::History => f.write_str("history"),
        }
    }
}

/// Lifecycle of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuring,
    Connected,
    Running(RunMode),
    Terminated,
}

/// Loop timing for both modes.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Wall-clock interval between live ticks.
    pub live_interval: Duration,
    /// Virtual hours advanced per live tick.
    pub live_step_hours: f64,
    /// Stop live mode after this many ticks.
    pub max_live_ticks: Option<u64>,
    /// Backfill window length.
    pub backfill_window: chrono::Duration,
    /// Backfill synthetic clock step.
    pub backfill_step: chrono::Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            live_interval: Duration::from_secs(10),
            live_step_hours: 0.5,
            max_live_ticks: None,
            backfill_window: chrono::Duration::days(30),
            backfill_step: chrono::Duration::hours(1),
        }
    }
}

/// Counters reported when a run terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: RunMode,
    /// Orchestrator ticks (each covers the whole fleet).
    pub ticks: u64,
    pub published: u64,
    pub failed: u64,
}

impl RunSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            ticks: 0,
            published: 0,
            failed: 0,
        }
    }
}

/// Owns the fleet, the generator, and the publisher link for one run.
///
/// Constructed in `Connected` with a publisher that is already linked; `run`
/// moves through `Running` to `Terminated` and always disconnects the
/// publisher on the way out, whether the run completed, was cancelled, or
/// failed.
pub struct Orchestrator<P: Publisher, R: RandomSource> {
    fleet: FleetRegistry,
    generator: TelemetryGenerator<R>,
    publisher: Option<P>,
    settings: RunSettings,
    phase: Phase,
}

impl<P: Publisher, R: RandomSource> Orchestrator<P, R> {
    pub fn new(
        fleet: FleetRegistry,
        generator: TelemetryGenerator<R>,
        publisher: P,
        settings: RunSettings,
    ) -> Self {
        let orchestrator = Self {
            fleet,
            generator,
            publisher: Some(publisher),
            settings,
            phase: Phase::Connected,
        };
        info!(assets = orchestrator.fleet.len(), "orchestrator connected");
        orchestrator
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn fleet(&self) -> &FleetRegistry {
        &self.fleet
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = ?self.phase, to = ?phase, "orchestrator phase change");
        self.phase = phase;
    }

    /// Runs `mode` to completion, then disconnects.
    ///
    /// Live mode ends when `shutdown` resolves or the tick limit is hit.
    /// Backfill ends after its window, anchored at the current time, or
    /// earlier when `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if a backfill loses its broker link. The publisher is
    /// disconnected before the error is returned.
    pub async fn run(
        mut self,
        mode: RunMode,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunSummary, SimError> {
        let outcome = match mode {
            RunMode::Live => Ok(self.run_live(shutdown).await),
            RunMode::History => self.run_backfill(Utc::now(), shutdown).await,
        };
        self.terminate().await;
        outcome
    }

    /// Ticks every `live_interval` until `shutdown` resolves.
    ///
    /// Readings are published fire-and-forget. A failed publish is logged and
    /// counted; the loop moves on to the next asset.
    pub async fn run_live(&mut self, shutdown: impl Future<Output = ()>) -> RunSummary {
        self.enter(Phase::Running(RunMode::Live));
        let mut summary = RunSummary::new(RunMode::Live);
        let policy = LivePolicy::new(self.settings.live_step_hours);
        let Some(publisher) = self.publisher.as_mut() else {
            return summary;
        };

        let mut ticker = tokio::time::interval(self.settings.live_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.settings.live_interval.as_secs_f64(),
            assets = self.fleet.len(),
            "live simulation started; press Ctrl+C to stop"
        );
        loop {
            if self
                .settings
                .max_live_ticks
                .is_some_and(|max| summary.ticks >= max)
            {
                info!(ticks = summary.ticks, "live tick limit reached");
                break;
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; stopping live simulation");
                    break;
                }
                _ = ticker.tick() => {}
            }

            for asset in self.fleet.assets_mut() {
                let reading = self.generator.generate(asset, &policy);
                match publisher.publish(&reading, Delivery::FireAndForget).await {
                    Ok(()) => {
                        summary.published += 1;
                        info!(
                            asset_id = reading.asset_id(),
                            power_kw = format_args!("{:.2}", reading.measurements.power_kw),
                            virtual_hour = reading.virtual_time_hour,
                            "sent telemetry"
                        );
                    }
                    Err(err) => {
                        summary.failed += 1;
                        warn!(asset_id = reading.asset_id(), error = %err, "publish failed");
                    }
                }
            }
            summary.ticks += 1;
        }
        summary
    }

    /// Replays the backfill window ending at `end` with historical timestamps.
    ///
    /// Every reading is published with confirmed delivery before the clock
    /// advances. A progress line is logged once per simulated day. When
    /// `shutdown` resolves, the backfill stops before the next publish,
    /// including one still waiting for its acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Publish`] when the broker link is lost; other
    /// per-message failures are logged and counted.
    pub async fn run_backfill(
        &mut self,
        end: DateTime<Utc>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunSummary, SimError> {
        self.enter(Phase::Running(RunMode::History));
        let mut summary = RunSummary::new(RunMode::History);
        let Some(publisher) = self.publisher.as_mut() else {
            return Ok(summary);
        };

        let mut clock =
            BackfillClock::ending_at(end, self.settings.backfill_window, self.settings.backfill_step);
        let total = clock.total_steps();
        let step_ms = self.settings.backfill_step.num_milliseconds().max(1);
        let steps_per_day = (86_400_000 / step_ms).max(1) as u64;
        tokio::pin!(shutdown);
        info!(
            start = %clock.start(),
            end = %end,
            steps = total,
            assets = self.fleet.len(),
            "backfill started"
        );

        'steps: while let Some((step, timestamp)) = clock.tick() {
            let policy = HistoricalPolicy::at(timestamp);
            for asset in self.fleet.assets_mut() {
                let reading = self.generator.generate(asset, &policy);
                let outcome = tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        info!(
                            step,
                            of = total,
                            messages = summary.published,
                            "shutdown requested; stopping backfill"
                        );
                        break 'steps;
                    }
                    outcome = publisher.publish(&reading, Delivery::Confirmed) => outcome,
                };
                match outcome {
                    Ok(()) => {
                        summary.published += 1;
                        debug!(asset_id = reading.asset_id(), %timestamp, "backfilled reading");
                    }
                    Err(err) if err.is_link_lost() => {
                        warn!(error = %err, published = summary.published, "backfill aborted");
                        return Err(err.into());
                    }
                    Err(err) => {
                        summary.failed += 1;
                        warn!(asset_id = reading.asset_id(), error = %err, "publish failed");
                    }
                }
            }
            summary.ticks += 1;

            if (step + 1) % steps_per_day == 0 {
                info!(
                    day = (step + 1) / steps_per_day,
                    step = step + 1,
                    of = total,
                    messages = summary.published,
                    "backfill progress"
                );
            }
        }

        info!(
            messages = summary.published,
            failed = summary.failed,
            "backfill finished"
        );
        Ok(summary)
    }

    /// Disconnects the publisher if it is still linked.
    async fn terminate(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            if let Err(err) = publisher.disconnect().await {
                warn!(error = %err, "disconnect failed");
            }
        }
        self.enter(Phase::Terminated);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::FleetConfig;
    use crate::devices::SeededRandom;
    use crate::publish::MemoryPublisher;
    use crate::sim::generator::GeneratorParams;

    fn orchestrator(
        settings: RunSettings,
    ) -> (Orchestrator<MemoryPublisher, SeededRandom>, crate::publish::MemoryHandle) {
        let mut rng = SeededRandom::from_seed(42);
        let fleet = FleetRegistry::from_config(&FleetConfig::madrid(), &mut rng).unwrap();
        let generator = TelemetryGenerator::new(GeneratorParams::default(), rng);
        let publisher = MemoryPublisher::new();
        let handle = publisher.handle();
        (Orchestrator::new(fleet, generator, publisher, settings), handle)
    }

    #[tokio::test]
    async fn starts_connected() {
        let (orch, _) = orchestrator(RunSettings::default());
        assert_eq!(orch.phase(), Phase::Connected);
    }

    #[tokio::test]
    async fn short_backfill_publishes_every_step_for_every_asset() {
        let settings = RunSettings {
            backfill_window: chrono::Duration::days(1),
            ..RunSettings::default()
        };
        let (mut orch, handle) = orchestrator(settings);
        let end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let summary = orch.run_backfill(end, std::future::pending()).await.unwrap();
        assert_eq!(summary.ticks, 25);
        assert_eq!(summary.published, 75);
        assert_eq!(handle.len(), 75);
        assert!(handle.deliveries().iter().all(|d| *d == Delivery::Confirmed));
    }

    #[tokio::test]
    async fn resolved_shutdown_stops_backfill_before_publishing() {
        let (mut orch, handle) = orchestrator(RunSettings::default());
        let end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let summary = orch.run_backfill(end, std::future::ready(())).await.unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.published, 0);
        assert!(handle.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn live_run_honours_tick_limit_and_disconnects() {
        let settings = RunSettings {
            max_live_ticks: Some(4),
            ..RunSettings::default()
        };
        let (orch, handle) = orchestrator(settings);
        let summary = orch
            .run(RunMode::Live, std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.ticks, 4);
        assert_eq!(handle.len(), 12);
        assert!(handle.is_disconnected());
        assert!(handle.deliveries().iter().all(|d| *d == Delivery::FireAndForget));
    }

    #[test]
    fn run_mode_displays_cli_names() {
        assert_eq!(RunMode::Live.to_string(), "live");
        assert_eq!(RunMode::History.to_string(), "history");
    }
}
