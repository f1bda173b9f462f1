//! TOML-based fleet configuration and preset definitions.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::devices::{AssetKind, Charger, Inverter};
use crate::sim::generator::GeneratorParams;
use crate::sim::orchestrator::RunSettings;
use crate::telemetry::{Location, TELEMETRY_TOPIC};

/// Top-level fleet configuration parsed from TOML.
///
/// Every table has defaults; a file that only sets `[simulation] seed` runs
/// the Madrid fleet. Load from TOML with [`FleetConfig::from_toml_file`] or
/// use [`FleetConfig::madrid`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// Timing, noise, and backfill parameters.
    pub simulation: SimulationConfig,
    /// Broker connection and topic.
    pub broker: BrokerConfig,
    /// Inverter model parameters, shared by all inverters.
    pub inverter: InverterConfig,
    /// Charger model parameters, shared by all chargers.
    pub charger: ChargerConfig,
    /// Named sites assets can reference.
    pub locations: Vec<LocationConfig>,
    /// The fleet, in publish order.
    pub assets: Vec<AssetConfig>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::madrid()
    }
}

/// Timing, noise, and backfill parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Random seed; entropy-seeded when absent.
    pub seed: Option<u64>,
    /// Wall-clock interval between live ticks (seconds).
    pub live_interval_secs: u64,
    /// Virtual hours advanced per live tick.
    pub live_step_hours: f64,
    /// Physical time one tick represents for energy accumulation (seconds).
    pub physical_tick_secs: f64,
    /// Virtual hour every asset starts at.
    pub initial_virtual_hour: f64,
    /// Relative measurement noise (0.02 for ±2%).
    pub noise_pct: f64,
    /// Lower bound of the seeded meter reading (kWh, inclusive).
    pub energy_seed_min_kwh: f64,
    /// Upper bound of the seeded meter reading (kWh, exclusive).
    pub energy_seed_max_kwh: f64,
    /// Length of the backfill window (days).
    pub backfill_days: u32,
    /// Synthetic clock step in backfill mode (minutes).
    pub backfill_step_minutes: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            live_interval_secs: 10,
            live_step_hours: 0.5,
            physical_tick_secs: 10.0,
            initial_virtual_hour: 6.0,
            noise_pct: 0.02,
            energy_seed_min_kwh: 100.0,
            energy_seed_max_kwh: 5000.0,
            backfill_days: 30,
            backfill_step_minutes: 60,
        }
    }
}

impl SimulationConfig {
    pub fn generator_params(&self) -> GeneratorParams {
        GeneratorParams {
            physical_tick_secs: self.physical_tick_secs,
            noise_pct: self.noise_pct,
        }
    }

    /// Loop timing for the orchestrator; `max_live_ticks` is left unset.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            live_interval: Duration::from_secs(self.live_interval_secs),
            live_step_hours: self.live_step_hours,
            max_live_ticks: None,
            backfill_window: chrono::Duration::days(i64::from(self.backfill_days)),
            backfill_step: chrono::Duration::minutes(i64::from(self.backfill_step_minutes)),
        }
    }
}

/// Broker connection and topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Host used when neither the CLI nor the environment names one.
    pub host: String,
    /// Port used when neither the CLI, the URI, nor the environment names one.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Topic readings are published to.
    pub topic: String,
    /// MQTT QoS level (0, 1 or 2).
    pub qos: u8,
    /// MQTT keep-alive (seconds).
    pub keep_alive_secs: u64,
    /// Upper bound on the initial connect handshake (seconds).
    pub connect_timeout_secs: u64,
    /// How long a disconnect may wait for buffered publishes (seconds).
    pub drain_timeout_secs: u64,
    /// Outbound request queue length of the MQTT client.
    pub channel_capacity: usize,
    /// Consecutive failed reconnects after which the link is declared closed.
    pub max_reconnect_attempts: u32,
    /// Pause between reconnect attempts (milliseconds).
    pub reconnect_backoff_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "energy_asset_simulator".to_string(),
            topic: TELEMETRY_TOPIC.to_string(),
            qos: 1,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            drain_timeout_secs: 5,
            channel_capacity: 100,
            max_reconnect_attempts: 10,
            reconnect_backoff_ms: 1000,
        }
    }
}

/// Inverter model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InverterConfig {
    /// Clear-sky peak output (kW).
    pub peak_kw: f64,
    /// Daylight window start (virtual hour, inclusive).
    pub daylight_start: f64,
    /// Daylight window end (virtual hour, inclusive).
    pub daylight_end: f64,
    /// Cloud factor lower bound.
    pub cloud_min: f64,
    /// Cloud factor upper bound.
    pub cloud_max: f64,
    /// Temperature at zero output (°C).
    pub ambient_temp_c: f64,
    /// Temperature rise per kW.
    pub temp_per_kw: f64,
    /// Uniform temperature jitter amplitude (°C).
    pub temp_jitter_c: f64,
}

impl Default for InverterConfig {
    fn default() -> Self {
        let inv = Inverter::default();
        Self {
            peak_kw: inv.peak_kw,
            daylight_start: inv.daylight_start,
            daylight_end: inv.daylight_end,
            cloud_min: inv.cloud_min,
            cloud_max: inv.cloud_max,
            ambient_temp_c: inv.ambient_temp_c,
            temp_per_kw: inv.temp_per_kw,
            temp_jitter_c: inv.temp_jitter_c,
        }
    }
}

impl InverterConfig {
    pub fn build(&self) -> Inverter {
        Inverter {
            ambient_temp_c: self.ambient_temp_c,
            temp_per_kw: self.temp_per_kw,
            temp_jitter_c: self.temp_jitter_c,
            ..Inverter::new(self.peak_kw, self.daylight_start, self.daylight_end)
        }
        .with_cloud_range(self.cloud_min, self.cloud_max)
    }
}

/// Charger model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargerConfig {
    /// Output while charging (kW).
    pub rated_kw: f64,
    /// Per-tick probability of starting a session when idle.
    pub start_probability: f64,
    /// Shortest session (ticks).
    pub min_session_ticks: u32,
    /// Longest session (ticks).
    pub max_session_ticks: u32,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            rated_kw: 11.0,
            start_probability: 0.2,
            min_session_ticks: 3,
            max_session_ticks: 10,
        }
    }
}

impl ChargerConfig {
    pub fn build(&self) -> Charger {
        Charger::new(
            self.rated_kw,
            self.start_probability,
            self.min_session_ticks,
            self.max_session_ticks,
        )
    }
}

/// A named site.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub market_zone: String,
    pub country_code: String,
}

impl LocationConfig {
    pub fn to_location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
            market_zone: self.market_zone.clone(),
            country_code: self.country_code.clone(),
        }
    }
}

/// One asset entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetConfig {
    /// Globally unique asset identifier.
    pub id: String,
    /// `"inverter"` or `"charger"`.
    pub kind: String,
    /// Name of an entry in `locations`.
    pub location: String,
}

impl AssetConfig {
    fn new(id: &str, kind: AssetKind, location: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.as_str().to_string(),
            location: location.to_string(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.live_interval_secs"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn madrid_site() -> LocationConfig {
    LocationConfig {
        name: "madrid".to_string(),
        latitude: 40.4168,
        longitude: -3.7038,
        market_zone: "BZN|ES".to_string(),
        country_code: "ES".to_string(),
    }
}

impl FleetConfig {
    /// The Madrid demo fleet: one inverter and two chargers on one site.
    pub fn madrid() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            broker: BrokerConfig::default(),
            inverter: InverterConfig::default(),
            charger: ChargerConfig::default(),
            locations: vec![madrid_site()],
            assets: vec![
                AssetConfig::new("INV-ES-MAD-001", AssetKind::Inverter, "madrid"),
                AssetConfig::new("EV-ES-MAD-002", AssetKind::Charger, "madrid"),
                AssetConfig::new("EV-ES-MAD-003", AssetKind::Charger, "madrid"),
            ],
        }
    }

    /// The Madrid fleet plus a Lisbon site in the Portuguese bidding zone.
    pub fn iberia() -> Self {
        let mut cfg = Self::madrid();
        cfg.locations.push(LocationConfig {
            name: "lisbon".to_string(),
            latitude: 38.7223,
            longitude: -9.1393,
            market_zone: "BZN|PT".to_string(),
            country_code: "PT".to_string(),
        });
        cfg.assets.extend([
            AssetConfig::new("INV-PT-LIS-001", AssetKind::Inverter, "lisbon"),
            AssetConfig::new("EV-PT-LIS-002", AssetKind::Charger, "lisbon"),
        ]);
        cfg
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["madrid", "iberia"];

    /// Loads a fleet from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "madrid" => Ok(Self::madrid()),
            "iberia" => Ok(Self::iberia()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a fleet from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a fleet from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let s = &self.simulation;
        let inv = &self.inverter;
        let ch = &self.charger;
        let floats = [
            ("simulation.live_step_hours", s.live_step_hours),
            ("simulation.physical_tick_secs", s.physical_tick_secs),
            ("simulation.initial_virtual_hour", s.initial_virtual_hour),
            ("simulation.noise_pct", s.noise_pct),
            ("simulation.energy_seed_min_kwh", s.energy_seed_min_kwh),
            ("simulation.energy_seed_max_kwh", s.energy_seed_max_kwh),
            ("inverter.peak_kw", inv.peak_kw),
            ("inverter.daylight_start", inv.daylight_start),
            ("inverter.daylight_end", inv.daylight_end),
            ("inverter.cloud_min", inv.cloud_min),
            ("inverter.cloud_max", inv.cloud_max),
            ("inverter.ambient_temp_c", inv.ambient_temp_c),
            ("inverter.temp_per_kw", inv.temp_per_kw),
            ("inverter.temp_jitter_c", inv.temp_jitter_c),
            ("charger.rated_kw", ch.rated_kw),
            ("charger.start_probability", ch.start_probability),
        ];
        for (field, value) in floats {
            if !value.is_finite() {
                errors.push(ConfigError::new(field, format!("must be a finite number, got {value}")));
            }
        }
        for (i, loc) in self.locations.iter().enumerate() {
            if !(-90.0..=90.0).contains(&loc.latitude) {
                errors.push(ConfigError::new(format!("locations[{i}].latitude"), "must be in [-90, 90]"));
            }
            if !(-180.0..=180.0).contains(&loc.longitude) {
                errors.push(ConfigError::new(format!("locations[{i}].longitude"), "must be in [-180, 180]"));
            }
        }

        if s.live_interval_secs == 0 {
            errors.push(ConfigError::new("simulation.live_interval_secs", "must be > 0"));
        }
        if s.live_step_hours <= 0.0 || s.live_step_hours >= 24.0 {
            errors.push(ConfigError::new("simulation.live_step_hours", "must be in (0, 24)"));
        }
        if s.physical_tick_secs <= 0.0 {
            errors.push(ConfigError::new("simulation.physical_tick_secs", "must be > 0"));
        }
        if !(0.0..24.0).contains(&s.initial_virtual_hour) {
            errors.push(ConfigError::new("simulation.initial_virtual_hour", "must be in [0, 24)"));
        }
        if !(0.0..1.0).contains(&s.noise_pct) {
            errors.push(ConfigError::new("simulation.noise_pct", "must be in [0.0, 1.0)"));
        }
        if s.energy_seed_min_kwh < 0.0 || s.energy_seed_min_kwh > s.energy_seed_max_kwh {
            errors.push(ConfigError::new(
                "simulation.energy_seed_min_kwh",
                "must be >= 0 and <= simulation.energy_seed_max_kwh",
            ));
        }
        if s.backfill_step_minutes == 0 {
            errors.push(ConfigError::new("simulation.backfill_step_minutes", "must be > 0"));
        }

        let b = &self.broker;
        if b.host.trim().is_empty() {
            errors.push(ConfigError::new("broker.host", "must not be empty"));
        }
        if b.topic.trim().is_empty() {
            errors.push(ConfigError::new("broker.topic", "must not be empty"));
        }
        if b.qos > 2 {
            errors.push(ConfigError::new("broker.qos", format!("must be 0, 1 or 2, got {}", b.qos)));
        }
        if b.channel_capacity == 0 {
            errors.push(ConfigError::new("broker.channel_capacity", "must be > 0"));
        }
        if b.max_reconnect_attempts == 0 {
            errors.push(ConfigError::new("broker.max_reconnect_attempts", "must be > 0"));
        }

        if inv.peak_kw < 0.0 {
            errors.push(ConfigError::new("inverter.peak_kw", "must be >= 0"));
        }
        if !(0.0 <= inv.daylight_start && inv.daylight_start < inv.daylight_end && inv.daylight_end <= 24.0) {
            errors.push(ConfigError::new(
                "inverter.daylight_start",
                "must satisfy 0 <= daylight_start < daylight_end <= 24",
            ));
        }
        if inv.cloud_min < 0.0 || inv.cloud_min > inv.cloud_max {
            errors.push(ConfigError::new("inverter.cloud_min", "must be >= 0 and <= inverter.cloud_max"));
        }
        if inv.temp_jitter_c < 0.0 {
            errors.push(ConfigError::new("inverter.temp_jitter_c", "must be >= 0"));
        }

        if ch.rated_kw < 0.0 {
            errors.push(ConfigError::new("charger.rated_kw", "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&ch.start_probability) {
            errors.push(ConfigError::new("charger.start_probability", "must be in [0.0, 1.0]"));
        }
        if ch.min_session_ticks == 0 || ch.min_session_ticks > ch.max_session_ticks {
            errors.push(ConfigError::new(
                "charger.min_session_ticks",
                "must be > 0 and <= charger.max_session_ticks",
            ));
        }

        let mut site_names = HashSet::new();
        for (i, loc) in self.locations.iter().enumerate() {
            if !site_names.insert(loc.name.as_str()) {
                errors.push(ConfigError::new(
                    format!("locations[{i}].name"),
                    format!("duplicate location \"{}\"", loc.name),
                ));
            }
        }

        if self.assets.is_empty() {
            errors.push(ConfigError::new("assets", "fleet must contain at least one asset"));
        }
        let mut ids = HashSet::new();
        for (i, asset) in self.assets.iter().enumerate() {
            if asset.id.trim().is_empty() {
                errors.push(ConfigError::new(format!("assets[{i}].id"), "must not be empty"));
            } else if !ids.insert(asset.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("assets[{i}].id"),
                    format!("duplicate asset id \"{}\"", asset.id),
                ));
            }
            if let Err(message) = asset.kind.parse::<AssetKind>() {
                errors.push(ConfigError::new(format!("assets[{i}].kind"), message));
            }
            if !site_names.contains(asset.location.as_str()) {
                errors.push(ConfigError::new(
                    format!("assets[{i}].location"),
                    format!("unknown location \"{}\"", asset.location),
                ));
            }
        }

        errors
    }
}
