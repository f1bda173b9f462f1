//! Common types and traits for device simulation components.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Contextual information passed to devices on every tick.
/// # Fields
/// * `virtual_hour` - The asset's simulated time of day, in `[0, 24)`
pub struct DeviceContext {
    pub virtual_hour: f64,
}

impl DeviceContext {
    /// Creates a new DeviceContext at the given virtual hour.
    pub fn new(virtual_hour: f64) -> Self {
        Self { virtual_hour }
    }
}

/// Trait defining a simulated energy asset that produces or consumes power.
///
/// Each call advances the device's internal state by exactly one tick, so
/// callers must invoke it once per generated reading.
pub trait Device {
    /// Returns the pre-noise power for this tick in kilowatts (always `>= 0`).
    ///
    /// # Arguments
    ///
    /// * `context` - Tick context (virtual hour)
    /// * `rng` - Random source for stochastic behaviour
    fn power_kw(&mut self, context: &DeviceContext, rng: &mut dyn RandomSource) -> f64;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;
}

/// The two asset kinds a fleet may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Inverter,
    Charger,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Inverter => "inverter",
            AssetKind::Charger => "charger",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inverter" => Ok(AssetKind::Inverter),
            "charger" => Ok(AssetKind::Charger),
            other => Err(format!(
                "unknown asset kind \"{other}\", expected \"inverter\" or \"charger\""
            )),
        }
    }
}

/// Source of randomness for device models and noise.
///
/// Abstracted so tests can replace the seeded generator with scripted values.
pub trait RandomSource {
    /// Uniform sample in `[low, high)`. Returns `low` when the range is empty
    /// or not finite.
    fn uniform(&mut self, low: f64, high: f64) -> f64;

    /// Returns `true` with probability `p`.
    fn chance(&mut self, p: f64) -> bool;

    /// Uniform integer sample in `[low, high]`.
    fn int_inclusive(&mut self, low: u32, high: u32) -> u32;
}

/// `RandomSource` backed by `StdRng`, reproducible for a fixed seed.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeds from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Seeded when `seed` is given, entropy-backed otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::from_seed)
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if !(high - low).is_finite() || high <= low {
            return low;
        }
        self.rng.random_range(low..high)
    }

    fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < p
    }

    fn int_inclusive(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        self.rng.random_range(low..=high)
    }
}

/// Applies independent multiplicative noise of up to `±pct` to `value`.
///
/// # Arguments
///
/// * `rng` - Random source
/// * `value` - Clean measurement
/// * `pct` - Relative noise amplitude (0.02 for ±2%)
///
/// # Returns
///
/// `value * (1 + u)` with `u ~ U[-pct, pct)`; `value` unchanged when `pct <= 0`
pub fn multiplicative_noise(rng: &mut dyn RandomSource, value: f64, pct: f64) -> f64 {
    if pct <= 0.0 {
        return value;
    }
    value * (1.0 + rng.uniform(-pct, pct))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_kind_parses_known_names() {
        assert_eq!("inverter".parse::<AssetKind>(), Ok(AssetKind::Inverter));
        assert_eq!("charger".parse::<AssetKind>(), Ok(AssetKind::Charger));
        assert!("battery".parse::<AssetKind>().is_err());
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let mut a = SeededRandom::from_seed(42);
        let mut b = SeededRandom::from_seed(42);
        for _ in 0..16 {
            assert_eq!(a.uniform(0.0, 1.0), b.uniform(0.0, 1.0));
            assert_eq!(a.int_inclusive(3, 10), b.int_inclusive(3, 10));
        }
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = SeededRandom::from_seed(7);
        for _ in 0..1000 {
            let v = rng.uniform(100.0, 5000.0);
            assert!((100.0..5000.0).contains(&v));
        }
    }

    #[test]
    fn empty_ranges_collapse_to_low() {
        let mut rng = SeededRandom::from_seed(7);
        assert_eq!(rng.uniform(1.0, 1.0), 1.0);
        assert_eq!(rng.int_inclusive(5, 5), 5);
        assert!(!rng.chance(0.0));
    }

    #[test]
    fn non_finite_ranges_collapse_to_low() {
        let mut rng = SeededRandom::from_seed(7);
        assert_eq!(rng.uniform(100.0, f64::INFINITY), 100.0);
        assert!(rng.uniform(f64::NAN, 1.0).is_nan());
        assert_eq!(rng.uniform(-2.0, f64::NAN), -2.0);
    }

    #[test]
    fn noise_is_bounded_and_disabled_at_zero() {
        let mut rng = SeededRandom::from_seed(1);
        for _ in 0..1000 {
            let v = multiplicative_noise(&mut rng, 100.0, 0.02);
            assert!((98.0..=102.0).contains(&v));
        }
        assert_eq!(multiplicative_noise(&mut rng, 100.0, 0.0), 100.0);
    }
}
