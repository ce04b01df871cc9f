//! The shared, mutable state of a simulation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::devices::{ChargingStation, StationaryBattery, Vehicle};
use crate::strategy::StrategyError;

use super::event::{Event, EventKind, VehicleAction};
use super::grid_connector::GridConnector;

/// Tolerance below the desired SOC still accepted at departure.
pub const DEPARTURE_SOC_TOLERANCE: f64 = 1e-3;

/// Every entity of the simulation, keyed by id.
///
/// Ordered maps keep iteration deterministic. `future_events` holds the
/// events that have been signalled but have not started yet, sorted by
/// start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    pub grid_connectors: BTreeMap<String, GridConnector>,
    pub charging_stations: BTreeMap<String, ChargingStation>,
    pub vehicles: BTreeMap<String, Vehicle>,
    pub batteries: BTreeMap<String, StationaryBattery>,
    pub future_events: Vec<Event>,
}

/// A vehicle left before reaching its desired SOC.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmetDeparture {
    pub vehicle_id: String,
    pub grid_connector_id: String,
    pub soc: f64,
    pub desired_soc: f64,
}

impl WorldState {
    pub fn grid_connector(&self, id: &str) -> Result<&GridConnector, StrategyError> {
        self.grid_connectors
            .get(id)
            .ok_or_else(|| StrategyError::UnknownGridConnector(id.to_string()))
    }

    pub fn grid_connector_mut(&mut self, id: &str) -> Result<&mut GridConnector, StrategyError> {
        self.grid_connectors
            .get_mut(id)
            .ok_or_else(|| StrategyError::UnknownGridConnector(id.to_string()))
    }

    pub fn charging_station(&self, id: &str) -> Result<&ChargingStation, StrategyError> {
        self.charging_stations
            .get(id)
            .ok_or_else(|| StrategyError::UnknownChargingStation(id.to_string()))
    }

    pub fn vehicle(&self, id: &str) -> Result<&Vehicle, StrategyError> {
        self.vehicles
            .get(id)
            .ok_or_else(|| StrategyError::UnknownVehicle(id.to_string()))
    }

    /// Iterates over the vehicles plugged into a station of `gc_id`, in id order.
    pub fn connected_vehicles<'a>(
        &'a self,
        gc_id: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Vehicle)> + 'a {
        self.vehicles.iter().filter(move |(_, v)| {
            v.connected_charging_station
                .as_deref()
                .and_then(|cs| self.charging_stations.get(cs))
                .is_some_and(|cs| cs.parent == gc_id)
        })
    }

    /// Appends newly signalled events, keeping `future_events` sorted by
    /// start time. Events with equal start times keep their release order.
    pub fn add_future_events(&mut self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        self.future_events.extend(events);
        self.future_events.sort_by_key(|e| e.start_time);
    }

    /// Clears the charging-station and battery components of every connector.
    ///
    /// Fixed loads and generation persist until a later event overwrites them.
    pub fn reset_device_loads(&mut self) {
        let Self {
            grid_connectors,
            charging_stations,
            batteries,
            ..
        } = self;
        for gc in grid_connectors.values_mut() {
            gc.current_loads
                .retain(|key, _| !charging_stations.contains_key(key) && !batteries.contains_key(key));
        }
    }

    /// Applies an event that has started.
    ///
    /// # Returns
    ///
    /// `Some` when the event is a departure below the desired SOC.
    ///
    /// # Errors
    ///
    /// Fails when the event references an unknown grid connector, vehicle or
    /// charging station.
    pub fn apply_event(&mut self, event: &Event) -> Result<Option<UnmetDeparture>, StrategyError> {
        match &event.kind {
            EventKind::FixedLoad {
                grid_connector_id,
                name,
                value,
            } => {
                self.grid_connector_mut(grid_connector_id)?
                    .set_load(name, *value);
            }
            EventKind::LocalEnergyGeneration {
                grid_connector_id,
                name,
                value,
            } => {
                self.grid_connector_mut(grid_connector_id)?
                    .set_load(name, -*value);
            }
            EventKind::GridOperatorSignal {
                grid_connector_id,
                max_power,
            } => {
                let gc = self.grid_connector_mut(grid_connector_id)?;
                if let Some(max_power) = max_power {
                    gc.cur_max_power = *max_power;
                }
            }
            EventKind::Vehicle {
                vehicle_id,
                action: VehicleAction::Arrival(update),
            } => {
                if let Some(cs_id) = &update.connected_charging_station {
                    self.charging_station(cs_id)?;
                }
                let vehicle = self
                    .vehicles
                    .get_mut(vehicle_id)
                    .ok_or_else(|| StrategyError::UnknownVehicle(vehicle_id.clone()))?;
                vehicle.arrive(update);
                debug!(vehicle = %vehicle_id, station = ?update.connected_charging_station, "vehicle arrived");
            }
            EventKind::Vehicle {
                vehicle_id,
                action: VehicleAction::Departure,
            } => {
                let vehicle = self.vehicle(vehicle_id)?;
                let grid_connector_id = vehicle
                    .connected_charging_station
                    .as_deref()
                    .and_then(|cs| self.charging_stations.get(cs))
                    .map(|cs| cs.parent.clone());
                let unmet = match grid_connector_id {
                    Some(grid_connector_id)
                        if vehicle.battery.soc < vehicle.desired_soc - DEPARTURE_SOC_TOLERANCE =>
                    {
                        Some(UnmetDeparture {
                            vehicle_id: vehicle_id.clone(),
                            grid_connector_id,
                            soc: vehicle.battery.soc,
                            desired_soc: vehicle.desired_soc,
                        })
                    }
                    _ => None,
                };
                if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
                    vehicle.depart();
                }
                debug!(vehicle = %vehicle_id, "vehicle departed");
                return Ok(unmet);
            }
        }
        Ok(None)
    }
}
