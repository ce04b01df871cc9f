use chrono::NaiveDateTime;
use tracing::debug;

use crate::sim::types::StepCommands;
use crate::sim::world::WorldState;

use super::{Strategy, StrategyError, clamp_power};

/// Baseline strategy: every connected vehicle charges immediately at the
/// highest power its station, the vehicle and the remaining connector
/// headroom allow, until it reaches its desired SOC.
///
/// Vehicles are served in id order, so earlier ids win when the connector
/// is tight. Stationary batteries stay idle.
#[derive(Debug, Clone, Copy)]
pub struct Greedy {
    dt_hours: f64,
}

impl Greedy {
    pub fn new(dt_hours: f64) -> Self {
        assert!(dt_hours > 0.0);
        Self { dt_hours }
    }
}

impl Strategy for Greedy {
    fn step(
        &mut self,
        world: &mut WorldState,
        now: NaiveDateTime,
    ) -> Result<StepCommands, StrategyError> {
        let mut commands = StepCommands::new(now);
        let WorldState {
            grid_connectors,
            charging_stations,
            vehicles,
            ..
        } = world;

        for vehicle in vehicles.values_mut() {
            let Some(cs_id) = vehicle.connected_charging_station.clone() else {
                continue;
            };
            let station = charging_stations
                .get(&cs_id)
                .ok_or_else(|| StrategyError::UnknownChargingStation(cs_id.clone()))?;
            let gc = grid_connectors
                .get_mut(&station.parent)
                .ok_or_else(|| StrategyError::UnknownGridConnector(station.parent.clone()))?;

            let to_desired =
                vehicle.energy_needed() / (self.dt_hours * vehicle.battery.efficiency);
            let power = clamp_power(
                to_desired.min(gc.headroom()),
                &vehicle.vehicle_type,
                station,
            );
            if power <= 0.0 {
                continue;
            }
            let avg_power = vehicle.battery.load(self.dt_hours, power).avg_power;
            commands
                .commands
                .insert(cs_id.clone(), gc.add_load(&cs_id, avg_power));
        }

        debug!(total_kw = commands.total_kw(), "greedy step");
        Ok(commands)
    }

    fn description(&self) -> &'static str {
        "Greedy"
    }
}
