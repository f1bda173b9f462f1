use std::f64::consts::PI;

use crate::devices::types::{Device, DeviceContext, RandomSource};

/// A solar inverter whose output follows a half-sine over the daylight window.
///
/// Output is shaped by the asset's *virtual* hour, not wall-clock time. Each
/// tick draws an independent cloud factor that scales the clear-sky curve;
/// the factor is never carried over to the next tick.
#[derive(Debug, Clone)]
pub struct Inverter {
    /// Clear-sky peak output in kilowatts.
    pub peak_kw: f64,

    /// First daylight hour (inclusive).
    pub daylight_start: f64,

    /// Last daylight hour (inclusive).
    pub daylight_end: f64,

    /// Lower bound of the per-tick cloud factor.
    pub cloud_min: f64,

    /// Upper bound of the per-tick cloud factor.
    pub cloud_max: f64,

    /// Heat sink temperature at zero output (°C).
    pub ambient_temp_c: f64,

    /// Temperature rise per kW of output.
    pub temp_per_kw: f64,

    /// Amplitude of the uniform temperature jitter (°C).
    pub temp_jitter_c: f64,
}

impl Default for Inverter {
    fn default() -> Self {
        Self {
            peak_kw: 50.0,
            daylight_start: 6.0,
            daylight_end: 20.0,
            cloud_min: 0.8,
            cloud_max: 1.0,
            ambient_temp_c: 25.0,
            temp_per_kw: 0.5,
            temp_jitter_c: 2.0,
        }
    }
}

impl Inverter {
    /// Creates an inverter with the given peak and daylight window and default
    /// cloud and thermal parameters.
    ///
    /// # Panics
    ///
    /// Panics if `daylight_start >= daylight_end`.
    pub fn new(peak_kw: f64, daylight_start: f64, daylight_end: f64) -> Self {
        assert!(daylight_start < daylight_end);
        Self {
            peak_kw: peak_kw.max(0.0),
            daylight_start,
            daylight_end,
            ..Self::default()
        }
    }

    /// Sets the cloud factor range, e.g. `(1.0, 1.0)` to pin clear sky.
    pub fn with_cloud_range(mut self, cloud_min: f64, cloud_max: f64) -> Self {
        self.cloud_min = cloud_min;
        self.cloud_max = cloud_max.max(cloud_min);
        self
    }

    pub fn is_daylight(&self, hour: f64) -> bool {
        (self.daylight_start..=self.daylight_end).contains(&hour)
    }

    /// Clear-sky output at `hour`: `peak * sin((hour - start) / (end - start) * π)`
    /// inside the daylight window, 0 outside.
    pub fn clear_sky_kw(&self, hour: f64) -> f64 {
        if !self.is_daylight(hour) {
            return 0.0;
        }
        let normalized = (hour - self.daylight_start) / (self.daylight_end - self.daylight_start) * PI;
        (self.peak_kw * normalized.sin()).max(0.0)
    }

    /// Inverter temperature for the given (pre-noise) output, with jitter.
    pub fn temperature_c(&self, power_kw: f64, rng: &mut dyn RandomSource) -> f64 {
        let base = self.ambient_temp_c + power_kw * self.temp_per_kw;
        base + rng.uniform(-self.temp_jitter_c, self.temp_jitter_c)
    }
}

impl Device for Inverter {
    fn power_kw(&mut self, context: &DeviceContext, rng: &mut dyn RandomSource) -> f64 {
        if !self.is_daylight(context.virtual_hour) {
            return 0.0;
        }
        let cloud_factor = rng.uniform(self.cloud_min, self.cloud_max);
        (self.clear_sky_kw(context.virtual_hour) * cloud_factor).max(0.0)
    }

    fn device_type(&self) -> &'static str {
        "Inverter"
    }
}
