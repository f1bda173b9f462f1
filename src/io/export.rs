//! CSV sink for telemetry readings.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::PublishError;
use crate::publish::{Delivery, Publisher};
use crate::telemetry::{TelemetryReading, iso_utc};

/// Column header for CSV telemetry export.
pub const HEADER: &str = "timestamp,asset_id,kind,market_zone,virtual_time_hour,\
                          power_kw,energy_total_kwh,inverter_temp_c";

/// Publisher that appends one CSV row per reading.
///
/// The header is written on the first publish. Chargers leave the
/// `inverter_temp_c` column empty.
pub struct CsvExport<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
    rows: u64,
}

impl CsvExport<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the file cannot be created.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvExport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(writer),
            header_written: false,
            rows: 0,
        }
    }

    /// Rows written so far, excluding the header.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn write_row(&mut self, reading: &TelemetryReading) -> csv::Result<()> {
        if !self.header_written {
            self.writer.write_record(HEADER.split(',').map(str::trim))?;
            self.header_written = true;
        }
        let m = &reading.measurements;
        self.writer.write_record(&[
            iso_utc::format(&reading.timestamp),
            reading.asset_id().to_string(),
            kind_label(reading).to_string(),
            reading.location.market_zone.clone(),
            format!("{:.2}", reading.virtual_time_hour),
            format!("{:.4}", m.power_kw),
            format!("{:.4}", m.energy_total_kwh),
            m.inverter_temp_c.map(|t| format!("{t:.2}")).unwrap_or_default(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn into_inner(mut self) -> Result<W, PublishError> {
        self.writer.flush().map_err(csv::Error::from)?;
        self.writer
            .into_inner()
            .map_err(|e| PublishError::Csv(csv::Error::from(e.into_error())))
    }
}

// Readings carry no kind field; only inverters report a temperature.
fn kind_label(reading: &TelemetryReading) -> &'static str {
    if reading.measurements.inverter_temp_c.is_some() {
        "inverter"
    } else {
        "charger"
    }
}

impl<W: Write> Publisher for CsvExport<W> {
    async fn publish(
        &mut self,
        reading: &TelemetryReading,
        _delivery: Delivery,
    ) -> Result<(), PublishError> {
        self.write_row(reading)?;
        Ok(())
    }

    async fn disconnect(self) -> Result<(), PublishError> {
        let rows = self.rows;
        self.into_inner()?;
        tracing::info!(rows, "telemetry CSV written");
        Ok(())
    }
}
