//! CSV export for simulation step results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::StepResult;

/// Column header for CSV telemetry export.
const HEADER: &str = "timestep,time,grid_connector_id,max_power_kw,fixed_load_kw,\
                      generation_kw,vehicles_kw,batteries_kw,total_kw,\
                      vehicles_charging,battery_soc,unmet_departures,within_limit";

/// Exports simulation results to a CSV file at the given path.
///
/// Writes a header row followed by one data row per connector and step.
/// Produces deterministic output for identical inputs.
///
/// # Arguments
///
/// * `results` - Complete simulation step results
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(results: &[StepResult], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(results, buf)
}

/// Writes simulation results as CSV to any writer.
///
/// Connectors without stationary batteries leave `battery_soc` empty.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(results: &[StepResult], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in results {
        wtr.write_record(&[
            r.timestep.to_string(),
            r.time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            r.grid_connector_id.clone(),
            format!("{:.4}", r.max_power_kw),
            format!("{:.4}", r.fixed_load_kw),
            format!("{:.4}", r.generation_kw),
            format!("{:.4}", r.vehicles_kw),
            format!("{:.4}", r.batteries_kw),
            format!("{:.4}", r.total_kw),
            r.vehicles_charging.to_string(),
            r.battery_soc.map(|soc| format!("{soc:.4}")).unwrap_or_default(),
            r.unmet_departures.to_string(),
            r.within_limit.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
