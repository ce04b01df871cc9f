//! Charging strategies.
//!
//! A strategy is called once per simulation step with the live world state.
//! It records the power it dispatches on the grid connectors and returns
//! the per-station commands.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::devices::{ChargingStation, VehicleType};
use crate::sim::types::StepCommands;
use crate::sim::world::WorldState;

pub mod balancer;
/// Water-filling of one vehicle's charging need.
pub mod fill;
pub mod greedy;
pub mod peak_shaving;

pub use greedy::Greedy;
pub use peak_shaving::{PeakShaving, PeakShavingOptions};

/// Errors raised while computing a step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    /// An arrival event for a vehicle that is already standing at the
    /// connector. Points at broken event ordering in the input data.
    #[error(
        "vehicle {vehicle_id} arrives at {start_time} while still standing \
         (open arrival record {open_idx}, timestep {timestep_idx})"
    )]
    DoubleArrival {
        vehicle_id: String,
        start_time: NaiveDateTime,
        open_idx: usize,
        timestep_idx: usize,
    },
    #[error("unknown vehicle: {0}")]
    UnknownVehicle(String),
    #[error("unknown charging station: {0}")]
    UnknownChargingStation(String),
    #[error("unknown grid connector: {0}")]
    UnknownGridConnector(String),
}

/// Per-step charging decision procedure.
///
/// Implementations mutate `world` in place: they charge vehicle and
/// stationary batteries and record the resulting power on the grid
/// connectors via `add_load`.
pub trait Strategy {
    /// Computes and applies the commands for the step starting at `now`.
    fn step(
        &mut self,
        world: &mut WorldState,
        now: NaiveDateTime,
    ) -> Result<StepCommands, StrategyError>;

    /// Human-readable name.
    fn description(&self) -> &'static str;
}

/// Limits a requested charging power to what the station and vehicle accept.
///
/// The power is capped at the station maximum; anything below the station
/// or vehicle minimum (including negative requests) becomes 0.
pub fn clamp_power(power: f64, vehicle_type: &VehicleType, station: &ChargingStation) -> f64 {
    let power = power.min(station.max_power);
    if power < station.min_power || power < vehicle_type.min_charging_power {
        0.0
    } else {
        power
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vt(min_charging_power: f64) -> VehicleType {
        VehicleType {
            capacity: 50.0,
            max_charging_power: 22.0,
            min_charging_power,
            efficiency: 1.0,
        }
    }

    #[test]
    fn clamp_caps_at_station_max() {
        let cs = ChargingStation::new("GC1", 0.0, 11.0);
        assert_eq!(clamp_power(20.0, &vt(0.0), &cs), 11.0);
        assert_eq!(clamp_power(5.0, &vt(0.0), &cs), 5.0);
    }

    #[test]
    fn clamp_drops_power_below_minimums() {
        let cs = ChargingStation::new("GC1", 2.0, 11.0);
        assert_eq!(clamp_power(1.5, &vt(0.0), &cs), 0.0);
        assert_eq!(clamp_power(3.0, &vt(4.0), &cs), 0.0);
        assert_eq!(clamp_power(-3.0, &vt(0.0), &ChargingStation::new("GC1", 0.0, 11.0)), 0.0);
    }

    #[test]
    fn error_messages_name_the_entity() {
        let err = StrategyError::UnknownVehicle("V7".into());
        assert_eq!(err.to_string(), "unknown vehicle: V7");
    }
}
