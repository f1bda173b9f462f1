//! Device models for the simulated energy assets.

/// EV charger state machine.
pub mod charger;
/// Solar inverter output and thermal model.
pub mod inverter;
pub mod types;

pub use charger::{Charger, ChargerState};
pub use inverter::Inverter;
pub use types::{
    AssetKind, Device, DeviceContext, RandomSource, SeededRandom, multiplicative_noise,
};
