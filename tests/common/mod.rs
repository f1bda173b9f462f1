//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use asset_twin::config::FleetConfig;
use asset_twin::devices::SeededRandom;
use asset_twin::error::PublishError;
use asset_twin::publish::{Delivery, Publisher};
use asset_twin::sim::fleet::FleetRegistry;
use asset_twin::sim::generator::TelemetryGenerator;
use asset_twin::sim::orchestrator::{Orchestrator, RunSettings};
use asset_twin::telemetry::TelemetryReading;

/// Seed used by every fixture.
pub const SEED: u64 = 42;

/// Fleet and generator for `cfg`, both drawing from one seeded source.
pub fn fleet_and_generator(cfg: &FleetConfig) -> (FleetRegistry, TelemetryGenerator<SeededRandom>) {
    let mut rng = SeededRandom::from_seed(cfg.simulation.seed.unwrap_or(SEED));
    let fleet = FleetRegistry::from_config(cfg, &mut rng).expect("fixture fleet should build");
    let generator = TelemetryGenerator::new(cfg.simulation.generator_params(), rng);
    (fleet, generator)
}

/// Orchestrator over the Madrid preset with `publisher`.
pub fn madrid_orchestrator<P: Publisher>(
    publisher: P,
    settings: RunSettings,
) -> Orchestrator<P, SeededRandom> {
    let (fleet, generator) = fleet_and_generator(&FleetConfig::madrid());
    Orchestrator::new(fleet, generator, publisher, settings)
}

/// Live settings with a tick limit and the default 10 s interval.
pub fn live_settings(max_ticks: Option<u64>) -> RunSettings {
    RunSettings {
        live_interval: Duration::from_secs(10),
        max_live_ticks: max_ticks,
        ..RunSettings::default()
    }
}

/// What [`FailingPublisher`] does once its budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The broker link is gone.
    LinkLost,
    /// One message could not be serialized; the link stays up.
    BadMessage,
}

/// Publisher that accepts `ok_budget` readings, then fails every publish.
pub struct FailingPublisher {
    ok_budget: usize,
    failure: Failure,
    pub accepted: Arc<AtomicUsize>,
    pub disconnected: Arc<AtomicBool>,
}

impl FailingPublisher {
    pub fn new(ok_budget: usize, failure: Failure) -> Self {
        Self {
            ok_budget,
            failure,
            accepted: Arc::new(AtomicUsize::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Publisher for FailingPublisher {
    async fn publish(
        &mut self,
        _reading: &TelemetryReading,
        _delivery: Delivery,
    ) -> Result<(), PublishError> {
        if self.accepted.load(Ordering::SeqCst) < self.ok_budget {
            self.accepted.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        match self.failure {
            Failure::LinkLost => Err(PublishError::LinkClosed),
            Failure::BadMessage => {
                let err = serde_json::from_str::<u8>("not json").expect_err("invalid json");
                Err(PublishError::Serialize(err))
            }
        }
    }

    async fn disconnect(self) -> Result<(), PublishError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Readings for one asset, in publish order.
pub fn readings_for<'a>(readings: &'a [TelemetryReading], asset_id: &str) -> Vec<&'a TelemetryReading> {
    readings.iter().filter(|r| r.asset_id() == asset_id).collect()
}

/// Publisher whose every publish takes `delay` to be acknowledged.
pub struct SlowPublisher {
    delay: Duration,
    pub accepted: Arc<AtomicUsize>,
    pub disconnected: Arc<AtomicBool>,
}

impl SlowPublisher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            accepted: Arc::new(AtomicUsize::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Publisher for SlowPublisher {
    async fn publish(
        &mut self,
        _reading: &TelemetryReading,
        _delivery: Delivery,
    ) -> Result<(), PublishError> {
        tokio::time::sleep(self.delay).await;
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(self) -> Result<(), PublishError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
