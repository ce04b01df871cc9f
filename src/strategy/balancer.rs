//! Stationary batteries flatten the connector load towards the horizon
//! average.

use std::collections::BTreeMap;

use crate::devices::StationaryBattery;
use crate::forecast::TimestepInfo;
use crate::sim::grid_connector::GridConnector;

/// Mean of the projected load over the horizon, counting net generation
/// as zero.
///
/// # Returns
///
/// The average in kW, or 0.0 for an empty horizon.
pub fn horizon_average(timesteps: &[TimestepInfo]) -> f64 {
    if timesteps.is_empty() {
        return 0.0;
    }
    let sum: f64 = timesteps.iter().map(|ts| ts.cur_power.max(0.0)).sum();
    (sum / timesteps.len() as f64).max(0.0)
}

/// Charges or discharges each battery of connector `gc_id` towards the
/// horizon average and records the power on the connector.
///
/// Batteries are visited in id order; each one sees the load left by the
/// previous. A deviation smaller than the battery's `min_charging_power`
/// leaves it idle.
///
/// # Returns
///
/// Battery id to recorded power (kW; positive=charge, negative=discharge).
pub fn balance(
    gc_id: &str,
    gc: &mut GridConnector,
    batteries: &mut BTreeMap<String, StationaryBattery>,
    timesteps: &mut [TimestepInfo],
    dt_hours: f64,
) -> BTreeMap<String, f64> {
    let mut dispatched = BTreeMap::new();
    for (battery_id, battery) in batteries.iter_mut().filter(|(_, b)| b.parent == gc_id) {
        let current = gc.get_current_load();
        if let Some(now) = timesteps.first_mut() {
            now.cur_power = current;
        }
        let delta = horizon_average(timesteps) - current;

        let power = if delta >= battery.min_charging_power {
            battery.battery.load(dt_hours, delta).avg_power
        } else if delta <= -battery.min_charging_power {
            -battery.battery.unload(dt_hours, -delta).avg_power
        } else {
            0.0
        };
        dispatched.insert(battery_id.clone(), gc.add_load(battery_id, power));
    }
    dispatched
}
