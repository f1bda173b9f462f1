pub mod asset;
/// Synthetic clock for backfill runs.
pub mod clock;
pub mod fleet;
/// Per-tick telemetry generation.
pub mod generator;
pub mod orchestrator;
/// Virtual-time policies for live and historical runs.
pub mod policy;
