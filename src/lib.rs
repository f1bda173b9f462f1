//! Digital twin of a fleet of energy assets (solar inverters and EV chargers)
//! that publishes simulated telemetry to an MQTT broker.

pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
/// Telemetry file sinks.
pub mod io;
pub mod publish;
/// Asset state, clock policies, fleet registry, and the run loops.
pub mod sim;
pub mod telemetry;
