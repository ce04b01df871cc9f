use chrono::NaiveDateTime;

use crate::devices::battery::Battery;
use crate::sim::event::VehicleUpdate;

/// Static properties shared by all vehicles of one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleType {
    /// Battery capacity in kWh.
    pub capacity: f64,
    /// Maximum charging power accepted by the vehicle (kW).
    pub max_charging_power: f64,
    /// Requests below this power (kW) are not served.
    pub min_charging_power: f64,
    /// Charging efficiency (0..1.0].
    pub efficiency: f64,
}

/// An electric vehicle of the fleet.
///
/// The vehicle owns its battery; the charging station it is plugged into
/// (if any) is referenced by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub vehicle_type: VehicleType,
    pub battery: Battery,
    /// State of charge the vehicle wants at departure.
    pub desired_soc: f64,
    pub connected_charging_station: Option<String>,
    pub estimated_time_of_departure: Option<NaiveDateTime>,
}

impl Vehicle {
    /// Creates a disconnected vehicle with the given initial and desired SOC.
    pub fn new(vehicle_type: VehicleType, soc: f64, desired_soc: f64) -> Self {
        Self {
            vehicle_type,
            battery: Battery::new(
                vehicle_type.capacity,
                soc,
                vehicle_type.max_charging_power,
                vehicle_type.efficiency,
            ),
            desired_soc,
            connected_charging_station: None,
            estimated_time_of_departure: None,
        }
    }

    /// Plugs the vehicle into `station` until `departure`.
    pub fn connect(mut self, station: impl Into<String>, departure: Option<NaiveDateTime>) -> Self {
        self.connected_charging_station = Some(station.into());
        self.estimated_time_of_departure = departure;
        self
    }

    /// Battery-side energy (kWh) still missing to reach the desired SOC.
    pub fn energy_needed(&self) -> f64 {
        self.battery.energy_needed(self.desired_soc)
    }

    /// Applies the payload of an arrival event.
    pub fn arrive(&mut self, update: &VehicleUpdate) {
        if let Some(desired_soc) = update.desired_soc {
            self.desired_soc = desired_soc;
        }
        self.battery.soc = (self.battery.soc + update.soc_delta).clamp(0.0, 1.0);
        self.estimated_time_of_departure = update.estimated_time_of_departure;
        self.connected_charging_station = update.connected_charging_station.clone();
    }

    /// Unplugs the vehicle.
    pub fn depart(&mut self) {
        self.connected_charging_station = None;
        self.estimated_time_of_departure = None;
    }
}
