//! Per-asset mutable state.

use std::sync::Arc;

use tracing::trace;

use crate::devices::{AssetKind, Charger, Device, DeviceContext, Inverter, RandomSource};
use crate::telemetry::Location;

/// Kind-specific device model owned by an asset.
#[derive(Debug, Clone)]
pub enum AssetModel {
    Inverter(Inverter),
    Charger(Charger),
}

impl AssetModel {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetModel::Inverter(_) => AssetKind::Inverter,
            AssetModel::Charger(_) => AssetKind::Charger,
        }
    }

    fn device_mut(&mut self) -> &mut dyn Device {
        match self {
            AssetModel::Inverter(inv) => inv,
            AssetModel::Charger(ch) => ch,
        }
    }
}

/// One simulated asset: identity, shared location, and exclusively owned state.
#[derive(Debug, Clone)]
pub struct Asset {
    id: String,
    location: Arc<Location>,
    model: AssetModel,
    energy_total_kwh: f64,
    virtual_hour: f64,
}

impl Asset {
    /// Creates an asset with a pre-existing meter reading.
    ///
    /// # Panics
    ///
    /// Panics if `energy_total_kwh` is negative or `virtual_hour` is outside `[0, 24)`.
    pub fn new(
        id: impl Into<String>,
        location: Arc<Location>,
        model: AssetModel,
        energy_total_kwh: f64,
        virtual_hour: f64,
    ) -> Self {
        assert!(energy_total_kwh >= 0.0);
        assert!((0.0..24.0).contains(&virtual_hour));
        Self {
            id: id.into(),
            location,
            model,
            energy_total_kwh,
            virtual_hour,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AssetKind {
        self.model.kind()
    }

    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }

    pub fn model(&self) -> &AssetModel {
        &self.model
    }

    /// Noise-free cumulative energy (kWh).
    pub fn energy_total_kwh(&self) -> f64 {
        self.energy_total_kwh
    }

    pub fn virtual_hour(&self) -> f64 {
        self.virtual_hour
    }

    pub(crate) fn set_virtual_hour(&mut self, hour: f64) {
        debug_assert!((0.0..24.0).contains(&hour));
        self.virtual_hour = hour;
    }

    /// Runs one device tick at the current virtual hour and accumulates energy
    /// over `physical_secs` of wall time.
    ///
    /// Returns the pre-noise power in kW.
    pub(crate) fn step(&mut self, physical_secs: f64, rng: &mut dyn RandomSource) -> f64 {
        let context = DeviceContext::new(self.virtual_hour);
        let device = self.model.device_mut();
        let power_kw = device.power_kw(&context, rng).max(0.0);
        trace!(asset_id = %self.id, device = device.device_type(), power_kw, "device tick");
        self.energy_total_kwh += power_kw * physical_secs / 3600.0;
        power_kw
    }
}
