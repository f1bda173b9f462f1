use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use super::{Delivery, Publisher};
use crate::error::PublishError;
use crate::telemetry::TelemetryReading;

#[derive(Debug, Default)]
struct Recorded {
    readings: Vec<(TelemetryReading, Delivery)>,
    disconnected: bool,
}

/// Publisher that keeps every reading in memory.
///
/// Tests keep a [`MemoryHandle`] to inspect what was published after the
/// publisher itself has been consumed by `disconnect`. Dry runs use
/// [`MemoryPublisher::logging`], which logs each reading instead of retaining it.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    recorded: Arc<Mutex<Recorded>>,
    log_readings: bool,
}

/// Read-only view onto a [`MemoryPublisher`]'s recordings.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs each reading's JSON at `info` and drops it.
    pub fn logging() -> Self {
        Self {
            log_readings: true,
            ..Self::default()
        }
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            recorded: Arc::clone(&self.recorded),
        }
    }
}

fn lock(recorded: &Mutex<Recorded>) -> MutexGuard<'_, Recorded> {
    recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryHandle {
    pub fn readings(&self) -> Vec<TelemetryReading> {
        lock(&self.recorded)
            .readings
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        lock(&self.recorded).readings.iter().map(|(_, d)| *d).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.recorded).readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disconnected(&self) -> bool {
        lock(&self.recorded).disconnected
    }
}

impl Publisher for MemoryPublisher {
    async fn publish(
        &mut self,
        reading: &TelemetryReading,
        delivery: Delivery,
    ) -> Result<(), PublishError> {
        if self.log_readings {
            let json = serde_json::to_string(reading)?;
            info!(asset_id = reading.asset_id(), "{json}");
            return Ok(());
        }
        lock(&self.recorded).readings.push((reading.clone(), delivery));
        Ok(())
    }

    async fn disconnect(self) -> Result<(), PublishError> {
        lock(&self.recorded).disconnected = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::telemetry::{Header, Location, Measurements};

    fn reading() -> TelemetryReading {
        TelemetryReading {
            header: Header {
                event_id: Uuid::new_v4(),
                version: "1.0".to_string(),
                asset_id: "EV-1".to_string(),
            },
            location: Arc::new(Location {
                latitude: 0.0,
                longitude: 0.0,
                market_zone: "BZN|ES".to_string(),
                country_code: "ES".to_string(),
            }),
            measurements: Measurements {
                power_kw: 11.0,
                energy_total_kwh: 200.0,
                inverter_temp_c: None,
            },
            timestamp: Utc::now(),
            virtual_time_hour: 6.5,
        }
    }

    #[tokio::test]
    async fn records_until_disconnected() {
        let mut publisher = MemoryPublisher::new();
        let handle = publisher.handle();
        publisher.publish(&reading(), Delivery::Confirmed).await.unwrap();
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.deliveries(), vec![Delivery::Confirmed]);
        assert!(!handle.is_disconnected());

        publisher.disconnect().await.unwrap();
        assert!(handle.is_disconnected());
        assert_eq!(handle.readings()[0].asset_id(), "EV-1");
    }

    #[tokio::test]
    async fn logging_publisher_retains_nothing() {
        let mut publisher = MemoryPublisher::logging();
        let handle = publisher.handle();
        publisher.publish(&reading(), Delivery::FireAndForget).await.unwrap();
        assert!(handle.is_empty());
    }
}
