//! Telemetry generation: one reading per asset tick.

use uuid::Uuid;

use super::asset::{Asset, AssetModel};
use super::policy::ClockPolicy;
use crate::devices::{RandomSource, multiplicative_noise};
use crate::telemetry::{
    Header, Measurements, TELEMETRY_SCHEMA_VERSION, TelemetryReading, round_hour,
};

/// Tunables shared by every generated reading.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorParams {
    /// Wall time represented by one tick for energy accumulation (seconds).
    pub physical_tick_secs: f64,
    /// Relative amplitude of the measurement noise (0.02 for ±2%).
    pub noise_pct: f64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            physical_tick_secs: 10.0,
            noise_pct: 0.02,
        }
    }
}

/// Turns asset state into telemetry readings.
///
/// Owns the random source for the whole fleet; assets are ticked sequentially
/// so a single source keeps runs reproducible for a fixed seed.
pub struct TelemetryGenerator<R: RandomSource> {
    params: GeneratorParams,
    rng: R,
}

impl<R: RandomSource> TelemetryGenerator<R> {
    pub fn new(params: GeneratorParams, rng: R) -> Self {
        Self { params, rng }
    }

    /// Advances `asset` by one tick under `policy` and returns its reading.
    ///
    /// The asset is mutated exactly once: virtual hour, device state, then
    /// energy. Noise is applied to the reported values only; the asset keeps
    /// its noise-free energy total.
    pub fn generate(&mut self, asset: &mut Asset, policy: &impl ClockPolicy) -> TelemetryReading {
        let (hour, timestamp) = policy.advance(asset.virtual_hour());
        asset.set_virtual_hour(hour);

        let power_kw = asset.step(self.params.physical_tick_secs, &mut self.rng);
        let inverter_temp_c = match asset.model() {
            AssetModel::Inverter(inv) => Some(inv.temperature_c(power_kw, &mut self.rng)),
            AssetModel::Charger(_) => None,
        };

        let pct = self.params.noise_pct;
        let measurements = Measurements {
            power_kw: multiplicative_noise(&mut self.rng, power_kw, pct),
            energy_total_kwh: multiplicative_noise(&mut self.rng, asset.energy_total_kwh(), pct),
            inverter_temp_c: inverter_temp_c.map(|t| multiplicative_noise(&mut self.rng, t, pct)),
        };

        TelemetryReading {
            header: Header {
                event_id: Uuid::new_v4(),
                version: TELEMETRY_SCHEMA_VERSION.to_string(),
                asset_id: asset.id().to_string(),
            },
            location: asset.location().clone(),
            measurements,
            timestamp,
            virtual_time_hour: round_hour(asset.virtual_hour()),
        }
    }
}
