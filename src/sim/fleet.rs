//! The fixed set of simulated assets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{ConfigError, FleetConfig};
use crate::devices::{AssetKind, RandomSource};
use crate::telemetry::Location;

use super::asset::{Asset, AssetModel};

/// Owns every asset for the lifetime of a run.
///
/// Built once from configuration; the set of assets and their locations never
/// change afterwards, only each asset's own mutable state does. Assets on the
/// same site share one `Arc<Location>`.
#[derive(Debug, Clone)]
pub struct FleetRegistry {
    assets: Vec<Asset>,
}

impl FleetRegistry {
    /// Builds the fleet, seeding each asset's meter reading from `rng`.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed entry: unknown asset kind, unknown or
    /// duplicate location, duplicate asset id, or an empty fleet.
    pub fn from_config(cfg: &FleetConfig, rng: &mut dyn RandomSource) -> Result<Self, ConfigError> {
        let mut sites: HashMap<&str, Arc<Location>> = HashMap::new();
        for (i, loc) in cfg.locations.iter().enumerate() {
            if sites
                .insert(loc.name.as_str(), Arc::new(loc.to_location()))
                .is_some()
            {
                return Err(ConfigError::new(
                    format!("locations[{i}].name"),
                    format!("duplicate location \"{}\"", loc.name),
                ));
            }
        }

        if cfg.assets.is_empty() {
            return Err(ConfigError::new("assets", "fleet must contain at least one asset"));
        }

        let sim = &cfg.simulation;
        let mut seen = HashSet::new();
        let mut assets = Vec::with_capacity(cfg.assets.len());
        for (i, entry) in cfg.assets.iter().enumerate() {
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::new(
                    format!("assets[{i}].id"),
                    format!("duplicate asset id \"{}\"", entry.id),
                ));
            }
            let kind = entry
                .kind
                .parse::<AssetKind>()
                .map_err(|message| ConfigError::new(format!("assets[{i}].kind"), message))?;
            let location = sites.get(entry.location.as_str()).cloned().ok_or_else(|| {
                ConfigError::new(
                    format!("assets[{i}].location"),
                    format!("unknown location \"{}\"", entry.location),
                )
            })?;
            let model = match kind {
                AssetKind::Inverter => AssetModel::Inverter(cfg.inverter.build()),
                AssetKind::Charger => AssetModel::Charger(cfg.charger.build()),
            };
            let energy = rng.uniform(sim.energy_seed_min_kwh, sim.energy_seed_max_kwh);
            assets.push(Asset::new(
                entry.id.clone(),
                location,
                model,
                energy,
                sim.initial_virtual_hour,
            ));
        }

        Ok(Self { assets })
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Assets in registry (publish) order.
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> impl Iterator<Item = &mut Asset> {
        self.assets.iter_mut()
    }

    pub fn get(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id() == id)
    }
}
