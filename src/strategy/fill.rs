use std::ops::Range;

use crate::devices::ChargingStation;
use crate::forecast::{ForecastVehicle, TimestepInfo};

use super::clamp_power;

/// Tolerance for power levels (kW) and energy amounts (kWh).
pub const EPS: f64 = 1e-5;

/// Resolved water level of one fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillLevel {
    /// Target connector load (kW) for the swept timesteps.
    pub level: f64,
    /// Number of lowest-load timesteps below the level.
    pub swept: usize,
}

/// Sorts the window's `(cur_power, index)` pairs ascending, ties by index.
fn sorted_levels(timesteps: &[TimestepInfo], window: Range<usize>) -> Vec<(f64, usize)> {
    let mut levels: Vec<(f64, usize)> = window.map(|i| (timesteps[i].cur_power, i)).collect();
    levels.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    levels
}

/// Finds the load level that supplies `energy_needed` kWh when every
/// timestep of the window is raised to it.
///
/// Candidate levels are the distinct loads of the window, swept from the
/// lowest; each timestep contributes `max(min(level, max_power) - cur_power, 0)`
/// for `dt_hours` at `efficiency`. Between two candidates the level is
/// interpolated linearly. If the highest candidate is still short, the
/// remainder is spread evenly over the swept timesteps above the highest
/// level, ignoring the ceilings.
pub fn find_level(
    timesteps: &[TimestepInfo],
    window: Range<usize>,
    energy_needed: f64,
    efficiency: f64,
    dt_hours: f64,
) -> FillLevel {
    let levels = sorted_levels(timesteps, window.clone());
    let Some(&(lowest, _)) = levels.first() else {
        return FillLevel {
            level: 0.0,
            swept: 0,
        };
    };
    let to_energy = dt_hours * efficiency;

    let mut swept = 0;
    let mut prev_level = lowest;
    let mut prev_energy = 0.0;
    while swept < levels.len() && energy_needed - prev_energy > EPS {
        let candidate = levels[swept].0;
        if candidate - prev_level < EPS {
            swept += 1;
            continue;
        }

        let energy = timesteps[window.clone()]
            .iter()
            .map(|ts| (candidate.min(ts.max_power) - ts.cur_power).max(0.0))
            .sum::<f64>()
            * to_energy;

        if energy - energy_needed > EPS {
            let frac = 1.0 - (energy - energy_needed) / (energy - prev_energy);
            return FillLevel {
                level: prev_level + frac * (candidate - prev_level),
                swept,
            };
        }

        prev_level = candidate;
        prev_energy = energy;
    }

    let remaining = energy_needed - prev_energy;
    if remaining > EPS {
        return FillLevel {
            level: prev_level + remaining / to_energy / swept.max(1) as f64,
            swept,
        };
    }
    FillLevel {
        level: prev_level,
        swept,
    }
}

/// Levels the charging of one vehicle over `window` against the projected
/// connector load.
///
/// The swept timesteps are charged in time order through the vehicle's
/// battery model; the power actually absorbed is added to their
/// `cur_power`, and any shortfall against the request is carried over to
/// the next timestep.
///
/// # Returns
///
/// The requested power at timestep 0, or 0 if the vehicle does not charge
/// now.
pub fn fill(
    window: Range<usize>,
    energy_needed: f64,
    timesteps: &mut [TimestepInfo],
    vehicle: &mut ForecastVehicle,
    station: &ChargingStation,
    dt_hours: f64,
) -> f64 {
    if energy_needed <= 0.0 || window.is_empty() {
        return 0.0;
    }

    let FillLevel { level, swept } = find_level(
        timesteps,
        window.clone(),
        energy_needed,
        vehicle.battery.efficiency,
        dt_hours,
    );

    let mut order: Vec<usize> = sorted_levels(timesteps, window)
        .into_iter()
        .take(swept)
        .map(|(_, i)| i)
        .collect();
    order.sort_unstable();

    let mut carry = 0.0;
    let mut command = 0.0;
    for i in order {
        let ts = &mut timesteps[i];
        let requested = clamp_power(
            (level + carry).min(ts.max_power) - ts.cur_power,
            &vehicle.vehicle_type,
            station,
        );
        let actual = vehicle.battery.load(dt_hours, requested).avg_power;
        ts.cur_power += actual;
        carry += requested - actual;
        if i == 0 {
            command = requested;
        }
    }
    command
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::devices::{Battery, VehicleType};

    fn timesteps(loads: &[f64], max_power: f64) -> Vec<TimestepInfo> {
        loads
            .iter()
            .map(|&cur_power| TimestepInfo {
                max_power,
                cur_power,
                vehicles: BTreeMap::new(),
            })
            .collect()
    }

    fn vehicle(soc: f64, efficiency: f64) -> ForecastVehicle {
        let vehicle_type = VehicleType {
            capacity: 100.0,
            max_charging_power: 50.0,
            min_charging_power: 0.0,
            efficiency,
        };
        ForecastVehicle {
            vehicle_type,
            battery: Battery::new(100.0, soc, 50.0, efficiency),
            desired_soc: 1.0,
            estimated_time_of_departure: None,
            connected_charging_station: Some("CS1".into()),
        }
    }

    fn station() -> ChargingStation {
        ChargingStation::new("GC1", 0.0, 50.0)
    }

    fn added(before: &[f64], after: &[TimestepInfo]) -> Vec<f64> {
        before
            .iter()
            .zip(after)
            .map(|(b, ts)| ts.cur_power - b)
            .collect()
    }

    #[test]
    fn flat_load_is_filled_evenly() {
        let mut ts = timesteps(&[0.0; 4], 100.0);
        let mut v = vehicle(0.0, 1.0);
        let cmd = fill(0..4, 10.0, &mut ts, &mut v, &station(), 0.25);

        assert_abs_diff_eq!(cmd, 10.0, epsilon = 1e-9);
        for t in &ts {
            assert_abs_diff_eq!(t.cur_power, 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn valleys_are_filled_first() {
        let loads = [10.0, 0.0, 5.0, 20.0];
        let mut ts = timesteps(&loads, 100.0);
        let mut v = vehicle(0.0, 1.0);
        let cmd = fill(0..4, 4.0, &mut ts, &mut v, &station(), 1.0);

        let delta = added(&loads, &ts);
        // 5 kWh would lift 0 -> 5; 4 kWh stops at level 4
        assert_abs_diff_eq!(delta[1], 4.0, epsilon = 1e-9);
        assert_eq!(delta[0], 0.0);
        assert_eq!(delta[2], 0.0);
        assert_eq!(delta[3], 0.0);
        assert_eq!(cmd, 0.0);
    }

    #[test]
    fn level_interpolates_between_candidates() {
        let loads = [10.0, 0.0, 5.0, 20.0];
        let ts = timesteps(&loads, 100.0);
        // 5 kWh reaches level 5 exactly; 7 more kWh at two steps -> level 8.5
        let level = find_level(&ts, 0..4, 12.0, 1.0, 1.0);
        assert_abs_diff_eq!(level.level, 8.5, epsilon = 1e-9);
        assert_eq!(level.swept, 2);
    }

    #[test]
    fn energy_is_conserved() {
        let loads = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6];
        let mut ts = timesteps(&loads, 100.0);
        let mut v = vehicle(0.2, 0.9);
        let need = 6.0;
        fill(0..6, need, &mut ts, &mut v, &station(), 0.5);

        let delivered: f64 = added(&loads, &ts).iter().sum::<f64>() * 0.5 * 0.9;
        assert_abs_diff_eq!(delivered, need, epsilon = 1e-6);
        assert_abs_diff_eq!(v.battery.soc, 0.26, epsilon = 1e-6);
    }

    #[test]
    fn lower_load_never_gets_less_power() {
        let loads = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 0.5, 7.0];
        let mut ts = timesteps(&loads, 100.0);
        let mut v = vehicle(0.0, 1.0);
        fill(0..8, 12.0, &mut ts, &mut v, &station(), 0.5);

        let delta = added(&loads, &ts);
        for i in 0..loads.len() {
            for j in 0..loads.len() {
                if loads[i] < loads[j] {
                    assert!(delta[i] + 1e-9 >= delta[j], "{i} vs {j}: {delta:?}");
                }
            }
        }
    }

    #[test]
    fn ceilings_are_respected_while_reachable() {
        let loads = [0.0, 0.0, 4.0];
        let mut ts = timesteps(&loads, 100.0);
        ts[1].max_power = 2.0;
        let mut v = vehicle(0.0, 1.0);
        fill(0..3, 6.0, &mut ts, &mut v, &station(), 1.0);

        let delta = added(&loads, &ts);
        assert_abs_diff_eq!(delta[0], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(delta[1], 2.0, epsilon = 1e-9);
        assert_eq!(delta[2], 0.0);
    }

    #[test]
    fn single_timestep_window_extrapolates() {
        let mut ts = timesteps(&[5.0], 100.0);
        let level = find_level(&ts, 0..1, 3.0, 1.0, 0.25);
        assert_eq!(level.swept, 1);
        assert_abs_diff_eq!(level.level, 17.0, epsilon = 1e-9);

        let mut v = vehicle(0.0, 1.0);
        let cmd = fill(0..1, 3.0, &mut ts, &mut v, &station(), 0.25);
        assert_abs_diff_eq!(cmd, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn station_limit_caps_every_step() {
        let mut ts = timesteps(&[0.0; 3], 100.0);
        let mut v = vehicle(0.0, 1.0);
        let cs = ChargingStation::new("GC1", 0.0, 4.0);
        // 15 kWh over 3 h would need 5 kW each; the station caps at 4
        let cmd = fill(0..3, 15.0, &mut ts, &mut v, &cs, 1.0);
        assert_eq!(cmd, 4.0);
        assert!(ts.iter().all(|t| (t.cur_power - 4.0).abs() < 1e-9));
    }

    #[test]
    fn nothing_needed_means_no_command() {
        let mut ts = timesteps(&[0.0; 3], 100.0);
        let mut v = vehicle(0.5, 1.0);
        assert_eq!(fill(0..3, 0.0, &mut ts, &mut v, &station(), 1.0), 0.0);
        assert!(ts.iter().all(|t| t.cur_power == 0.0));
    }
}
