//! Outbound telemetry message shape.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version stamped into every message header.
pub const TELEMETRY_SCHEMA_VERSION: &str = "1.0";

/// Default broker topic for raw telemetry.
pub const TELEMETRY_TOPIC: &str = "telemetry_raw";

/// Static site description shared by every asset at that site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub market_zone: String,
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub event_id: Uuid,
    pub version: String,
    pub asset_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub power_kw: f64,
    pub energy_total_kwh: f64,
    /// Present for inverters only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverter_temp_c: Option<f64>,
}

/// One telemetry message for one asset at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub header: Header,
    pub location: Arc<Location>,
    pub measurements: Measurements,
    #[serde(with = "iso_utc")]
    pub timestamp: DateTime<Utc>,
    pub virtual_time_hour: f64,
}

impl TelemetryReading {
    pub fn asset_id(&self) -> &str {
        &self.header.asset_id
    }

    /// Serializes to the JSON wire format.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Rounds the debug virtual hour to two decimals.
pub fn round_hour(hour: f64) -> f64 {
    (hour * 100.0).round() / 100.0
}

/// RFC 3339 in UTC with a `Z` suffix and microsecond precision.
pub mod iso_utc {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}
