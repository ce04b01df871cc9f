//! Post-hoc KPI computation from simulation results.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::types::StepResult;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from `Vec<StepResult>` to ensure consistency between
/// step data and reported metrics. Site figures sum all grid connectors
/// per timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    /// Highest site load (kW).
    pub peak_load_kw: f64,
    /// Mean site load (kW).
    pub mean_load_kw: f64,
    /// Mean over peak load; 1.0 is a perfectly flat profile.
    pub load_factor: f64,
    /// Highest site export (kW, positive magnitude).
    pub peak_export_kw: f64,
    /// Energy imported from the grid (kWh).
    pub energy_from_grid_kwh: f64,
    /// Energy delivered to vehicles (kWh, grid side).
    pub vehicle_energy_kwh: f64,
    /// Total stationary battery throughput (kWh, sum of |power| * dt).
    pub battery_throughput_kwh: f64,
    /// Vehicles that left below their desired SOC.
    pub unmet_departures: usize,
    /// Connector-steps where the load exceeded the ceiling.
    pub limit_violation_count: usize,
}

impl KpiReport {
    /// Computes all KPIs from the complete step record vector.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `dt_hours` - Timestep duration in hours
    ///
    /// # Returns
    ///
    /// A `KpiReport` with all fields populated.
    pub fn from_results(results: &[StepResult], dt_hours: f64) -> Self {
        let mut site: BTreeMap<usize, f64> = BTreeMap::new();
        let mut vehicle_kw_sum = 0.0;
        let mut battery_abs_sum = 0.0;
        let mut unmet_departures = 0;
        let mut limit_violation_count = 0;

        for r in results {
            *site.entry(r.timestep).or_insert(0.0) += r.total_kw;
            vehicle_kw_sum += r.vehicles_kw;
            battery_abs_sum += r.batteries_kw.abs();
            unmet_departures += r.unmet_departures;
            if !r.within_limit {
                limit_violation_count += 1;
            }
        }

        let peak_load_kw = site.values().copied().fold(0.0, f64::max);
        let peak_export_kw = site.values().map(|kw| -kw).fold(0.0, f64::max);
        let mean_load_kw = if site.is_empty() {
            0.0
        } else {
            site.values().sum::<f64>() / site.len() as f64
        };
        let load_factor = if peak_load_kw > 0.0 {
            mean_load_kw / peak_load_kw
        } else {
            0.0
        };
        let energy_from_grid_kwh = site.values().map(|kw| kw.max(0.0)).sum::<f64>() * dt_hours;

        Self {
            peak_load_kw,
            mean_load_kw,
            load_factor,
            peak_export_kw,
            energy_from_grid_kwh,
            vehicle_energy_kwh: vehicle_kw_sum * dt_hours,
            battery_throughput_kwh: battery_abs_sum * dt_hours,
            unmet_departures,
            limit_violation_count,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Peak load:             {:.2} kW", self.peak_load_kw)?;
        writeln!(f, "Mean load:             {:.2} kW", self.mean_load_kw)?;
        writeln!(f, "Load factor:           {:.3}", self.load_factor)?;
        writeln!(f, "Peak export:           {:.2} kW", self.peak_export_kw)?;
        writeln!(f, "Energy from grid:      {:.2} kWh", self.energy_from_grid_kwh)?;
        writeln!(f, "Energy to vehicles:    {:.2} kWh", self.vehicle_energy_kwh)?;
        writeln!(f, "Battery throughput:    {:.2} kWh", self.battery_throughput_kwh)?;
        writeln!(f, "Unmet departures:      {}", self.unmet_departures)?;
        write!(f, "Limit violations:      {}", self.limit_violation_count)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    use super::*;

    fn make_result(timestep: usize, gc: &str, total_kw: f64, vehicles_kw: f64) -> StepResult {
        StepResult {
            timestep,
            time: NaiveDate::from_ymd_opt(2023, 1, 2)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
            grid_connector_id: gc.into(),
            max_power_kw: 100.0,
            fixed_load_kw: total_kw - vehicles_kw,
            generation_kw: 0.0,
            vehicles_kw,
            batteries_kw: 0.0,
            total_kw,
            vehicles_charging: 0,
            battery_soc: None,
            unmet_departures: 0,
            within_limit: true,
        }
    }

    #[test]
    fn site_load_sums_connectors() {
        let results = vec![
            make_result(0, "GC1", 10.0, 0.0),
            make_result(0, "GC2", 30.0, 10.0),
            make_result(1, "GC1", 10.0, 0.0),
            make_result(1, "GC2", 10.0, 10.0),
        ];
        let kpi = KpiReport::from_results(&results, 0.5);
        assert_eq!(kpi.peak_load_kw, 40.0);
        assert_eq!(kpi.mean_load_kw, 30.0);
        assert_abs_diff_eq!(kpi.load_factor, 0.75, epsilon = 1e-12);
        assert_eq!(kpi.energy_from_grid_kwh, 30.0);
        assert_eq!(kpi.vehicle_energy_kwh, 10.0);
    }

    #[test]
    fn export_and_violations() {
        let mut over = make_result(0, "GC1", 120.0, 0.0);
        over.within_limit = false;
        over.unmet_departures = 2;
        let mut export = make_result(1, "GC1", -8.0, 0.0);
        export.batteries_kw = -4.0;
        let kpi = KpiReport::from_results(&[over, export], 1.0);

        assert_eq!(kpi.peak_export_kw, 8.0);
        assert_eq!(kpi.energy_from_grid_kwh, 120.0);
        assert_eq!(kpi.battery_throughput_kwh, 4.0);
        assert_eq!(kpi.limit_violation_count, 1);
        assert_eq!(kpi.unmet_departures, 2);
    }

    #[test]
    fn empty_results_give_zeros() {
        let kpi = KpiReport::from_results(&[], 0.25);
        assert_eq!(kpi.peak_load_kw, 0.0);
        assert_eq!(kpi.load_factor, 0.0);
        assert!(!format!("{kpi}").is_empty());
    }
}
