//! Lookahead projection of one grid connector over the strategy horizon.
//!
//! The forecast replays the known future events on top of the current world
//! state without touching it: vehicles are represented by [`ForecastVehicle`]
//! snapshots and the connector's load components by a local copy.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};

use crate::devices::{Battery, Vehicle, VehicleType};
use crate::sim::event::{Event, EventKind, VehicleAction, VehicleUpdate};
use crate::sim::world::WorldState;
use crate::strategy::StrategyError;

/// Projected state of the connector at one future timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepInfo {
    /// Connector ceiling in force (kW).
    pub max_power: f64,
    /// Projected load (kW). Starts as the sum of fixed loads and generation;
    /// scheduling adds vehicle power on top.
    pub cur_power: f64,
    /// Vehicles present, mapped to the index of their arrival record.
    pub vehicles: BTreeMap<String, usize>,
}

/// The mutable part of a vehicle as seen by the forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastVehicle {
    pub vehicle_type: VehicleType,
    pub battery: Battery,
    pub desired_soc: f64,
    pub estimated_time_of_departure: Option<NaiveDateTime>,
    pub connected_charging_station: Option<String>,
}

impl ForecastVehicle {
    /// Battery-side energy (kWh) still missing to reach the desired SOC.
    pub fn energy_needed(&self) -> f64 {
        self.battery.energy_needed(self.desired_soc)
    }

    /// Applies the payload of an arrival, like [`Vehicle::arrive`].
    pub fn apply_arrival(&mut self, update: &VehicleUpdate) {
        if let Some(desired_soc) = update.desired_soc {
            self.desired_soc = desired_soc;
        }
        self.battery.soc = (self.battery.soc + update.soc_delta).clamp(0.0, 1.0);
        self.estimated_time_of_departure = update.estimated_time_of_departure;
        self.connected_charging_station = update.connected_charging_station.clone();
    }
}

impl From<&Vehicle> for ForecastVehicle {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            vehicle_type: vehicle.vehicle_type,
            battery: vehicle.battery.clone(),
            desired_soc: vehicle.desired_soc,
            estimated_time_of_departure: vehicle.estimated_time_of_departure,
            connected_charging_station: vehicle.connected_charging_station.clone(),
        }
    }
}

/// One standing interval of a vehicle at the connector.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleArrival {
    pub vehicle_id: String,
    pub charging_station_id: String,
    /// Snapshot of the vehicle when the interval opens.
    pub vehicle: ForecastVehicle,
    /// First timestep index the vehicle is present.
    pub arrival_idx: usize,
    /// Timestep index of departure; `None` if unknown.
    pub depart_idx: Option<usize>,
}

/// Output of [`ForecastBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// One entry per horizon step; index 0 is the current step.
    pub timesteps: Vec<TimestepInfo>,
    pub arrivals: Vec<VehicleArrival>,
}

/// Builds the forecast of one connector at time `now`.
#[derive(Debug, Clone, Copy)]
pub struct ForecastBuilder {
    pub now: NaiveDateTime,
    pub interval: TimeDelta,
    /// Number of timesteps to project.
    pub horizon: usize,
}

impl ForecastBuilder {
    pub fn new(now: NaiveDateTime, interval: TimeDelta, horizon: usize) -> Self {
        Self {
            now,
            interval,
            horizon,
        }
    }

    /// Number of whole intervals from `now` until `time`, rounded up and
    /// never negative.
    pub fn steps_until(&self, time: NaiveDateTime) -> usize {
        let delta = (time - self.now).num_milliseconds();
        let step = self.interval.num_milliseconds().max(1);
        let steps = -((-delta).div_euclid(step));
        steps.max(0) as usize
    }

    /// Projects connector `gc_id` over the horizon.
    ///
    /// `events` must be sorted by start time and must not contain events
    /// that already took effect. Events for other connectors are skipped;
    /// vehicle events update the vehicle snapshots regardless of where the
    /// vehicle plugs in.
    ///
    /// # Errors
    ///
    /// * [`StrategyError::DoubleArrival`] if a vehicle arrives at this
    ///   connector while it already stands here
    /// * `Unknown*` if an entity referenced by the state or the events does
    ///   not exist
    pub fn build(
        &self,
        gc_id: &str,
        world: &WorldState,
        events: &[Event],
    ) -> Result<Forecast, StrategyError> {
        let gc = world.grid_connector(gc_id)?;

        let mut vehicles: BTreeMap<&str, ForecastVehicle> = world
            .vehicles
            .iter()
            .map(|(id, v)| (id.as_str(), ForecastVehicle::from(v)))
            .collect();

        let mut present = BTreeMap::new();
        let mut arrivals = Vec::new();
        for (vehicle_id, vehicle) in &world.vehicles {
            let Some(cs_id) = vehicle.connected_charging_station.as_deref() else {
                continue;
            };
            if world.charging_station(cs_id)?.parent != gc_id {
                continue;
            }
            present.insert(vehicle_id.clone(), arrivals.len());
            arrivals.push(VehicleArrival {
                vehicle_id: vehicle_id.clone(),
                charging_station_id: cs_id.to_string(),
                vehicle: ForecastVehicle::from(vehicle),
                arrival_idx: 0,
                depart_idx: vehicle
                    .estimated_time_of_departure
                    .map(|etd| self.steps_until(etd)),
            });
        }

        let mut max_power = gc.cur_max_power;
        let mut loads = gc.current_loads.clone();
        let mut pending = events.iter().peekable();
        let mut timesteps = Vec::with_capacity(self.horizon);

        for idx in 0..self.horizon {
            let time = self.now + self.interval * idx as i32;

            while let Some(event) = pending.next_if(|e| e.start_time <= time) {
                match &event.kind {
                    EventKind::LocalEnergyGeneration {
                        grid_connector_id,
                        name,
                        value,
                    } if grid_connector_id == gc_id => {
                        loads.insert(name.clone(), -value);
                    }
                    EventKind::FixedLoad {
                        grid_connector_id,
                        name,
                        value,
                    } if grid_connector_id == gc_id => {
                        loads.insert(name.clone(), *value);
                    }
                    EventKind::GridOperatorSignal {
                        grid_connector_id,
                        max_power: Some(signal_max),
                    } if grid_connector_id == gc_id => {
                        max_power = *signal_max;
                    }
                    EventKind::Vehicle {
                        vehicle_id,
                        action: VehicleAction::Departure,
                    } => {
                        if let Some(record) = present.remove(vehicle_id) {
                            arrivals[record].depart_idx = Some(idx);
                        }
                        let vehicle = vehicles
                            .get_mut(vehicle_id.as_str())
                            .ok_or_else(|| StrategyError::UnknownVehicle(vehicle_id.clone()))?;
                        vehicle.battery.soc = vehicle.battery.soc.max(vehicle.desired_soc);
                    }
                    EventKind::Vehicle {
                        vehicle_id,
                        action: VehicleAction::Arrival(update),
                    } => {
                        let Some(cs_id) = update.connected_charging_station.as_deref() else {
                            continue;
                        };
                        let vehicle = vehicles
                            .get_mut(vehicle_id.as_str())
                            .ok_or_else(|| StrategyError::UnknownVehicle(vehicle_id.clone()))?;
                        vehicle.apply_arrival(update);

                        if world.charging_station(cs_id)?.parent != gc_id {
                            continue;
                        }
                        if let Some(&open_idx) = present.get(vehicle_id) {
                            return Err(StrategyError::DoubleArrival {
                                vehicle_id: vehicle_id.clone(),
                                start_time: event.start_time,
                                open_idx,
                                timestep_idx: idx,
                            });
                        }
                        present.insert(vehicle_id.clone(), arrivals.len());
                        arrivals.push(VehicleArrival {
                            vehicle_id: vehicle_id.clone(),
                            charging_station_id: cs_id.to_string(),
                            vehicle: vehicle.clone(),
                            arrival_idx: idx,
                            depart_idx: vehicle
                                .estimated_time_of_departure
                                .map(|etd| self.steps_until(etd)),
                        });
                    }
                    _ => {}
                }
            }

            timesteps.push(TimestepInfo {
                max_power,
                cur_power: loads.values().sum(),
                vehicles: present.clone(),
            });
        }

        Ok(Forecast {
            timesteps,
            arrivals,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::devices::ChargingStation;
    use crate::sim::grid_connector::GridConnector;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn at(minutes: i64) -> NaiveDateTime {
        t0() + TimeDelta::minutes(minutes)
    }

    fn builder(horizon: usize) -> ForecastBuilder {
        ForecastBuilder::new(t0(), TimeDelta::minutes(15), horizon)
    }

    fn world() -> WorldState {
        let vt = VehicleType {
            capacity: 50.0,
            max_charging_power: 22.0,
            min_charging_power: 0.0,
            efficiency: 1.0,
        };
        let mut w = WorldState::default();
        w.grid_connectors.insert("GC1".into(), GridConnector::new(100.0));
        w.grid_connectors.insert("GC2".into(), GridConnector::new(50.0));
        w.charging_stations
            .insert("CS1".into(), ChargingStation::new("GC1", 0.0, 22.0));
        w.charging_stations
            .insert("CS2".into(), ChargingStation::new("GC2", 0.0, 22.0));
        w.vehicles.insert(
            "V1".into(),
            Vehicle::new(vt, 0.5, 0.8).connect("CS1", Some(at(50))),
        );
        w.vehicles.insert("V2".into(), Vehicle::new(vt, 0.2, 0.6));
        w
    }

    fn arrival(vehicle_id: &str, cs: &str, start: i64, etd: Option<i64>) -> Event {
        Event::at(
            at(start),
            EventKind::Vehicle {
                vehicle_id: vehicle_id.into(),
                action: VehicleAction::Arrival(VehicleUpdate {
                    connected_charging_station: Some(cs.into()),
                    estimated_time_of_departure: etd.map(at),
                    desired_soc: Some(0.9),
                    soc_delta: -0.1,
                }),
            },
        )
    }

    fn departure(vehicle_id: &str, start: i64) -> Event {
        Event::at(
            at(start),
            EventKind::Vehicle {
                vehicle_id: vehicle_id.into(),
                action: VehicleAction::Departure,
            },
        )
    }

    #[test]
    fn steps_until_rounds_up() {
        let b = builder(4);
        assert_eq!(b.steps_until(at(0)), 0);
        assert_eq!(b.steps_until(at(1)), 1);
        assert_eq!(b.steps_until(at(30)), 2);
        assert_eq!(b.steps_until(at(50)), 4);
        assert_eq!(b.steps_until(at(-40)), 0);
    }

    #[test]
    fn connected_vehicles_open_records_at_zero() {
        let forecast = builder(8).build("GC1", &world(), &[]).unwrap();

        assert_eq!(forecast.timesteps.len(), 8);
        assert_eq!(forecast.arrivals.len(), 1);
        let record = &forecast.arrivals[0];
        assert_eq!(record.vehicle_id, "V1");
        assert_eq!(record.arrival_idx, 0);
        assert_eq!(record.depart_idx, Some(4));
        assert!(forecast.timesteps.iter().all(|ts| ts.vehicles.contains_key("V1")));
    }

    #[test]
    fn load_and_signal_events_are_replayed() {
        let mut w = world();
        w.grid_connectors
            .get_mut("GC1")
            .unwrap()
            .set_load("building", 5.0);
        let events = vec![
            Event::at(
                at(15),
                EventKind::FixedLoad {
                    grid_connector_id: "GC1".into(),
                    name: "building".into(),
                    value: 8.0,
                },
            ),
            Event::at(
                at(30),
                EventKind::LocalEnergyGeneration {
                    grid_connector_id: "GC1".into(),
                    name: "pv".into(),
                    value: 3.0,
                },
            ),
            Event::at(
                at(30),
                EventKind::GridOperatorSignal {
                    grid_connector_id: "GC1".into(),
                    max_power: Some(60.0),
                },
            ),
            Event::at(
                at(30),
                EventKind::FixedLoad {
                    grid_connector_id: "GC2".into(),
                    name: "building".into(),
                    value: 100.0,
                },
            ),
            Event::at(
                at(45),
                EventKind::GridOperatorSignal {
                    grid_connector_id: "GC1".into(),
                    max_power: None,
                },
            ),
        ];

        let ts = builder(4).build("GC1", &w, &events).unwrap().timesteps;
        let cur: Vec<f64> = ts.iter().map(|t| t.cur_power).collect();
        let max: Vec<f64> = ts.iter().map(|t| t.max_power).collect();
        assert_eq!(cur, [5.0, 8.0, 5.0, 5.0]);
        assert_eq!(max, [100.0, 100.0, 60.0, 60.0]);
    }

    #[test]
    fn departure_closes_record_and_tops_off_snapshot() {
        let events = vec![departure("V1", 30), arrival("V1", "CS1", 60, Some(120))];
        let forecast = builder(8).build("GC1", &world(), &events).unwrap();

        assert_eq!(forecast.arrivals.len(), 2);
        assert_eq!(forecast.arrivals[0].depart_idx, Some(2));
        assert!(!forecast.timesteps[2].vehicles.contains_key("V1"));

        let second = &forecast.arrivals[1];
        assert_eq!(second.arrival_idx, 4);
        assert_eq!(second.depart_idx, Some(8));
        // topped off to 0.8 at departure, then 0.1 used on the road
        assert!((second.vehicle.battery.soc - 0.7).abs() < 1e-9);
        assert_eq!(second.vehicle.desired_soc, 0.9);
    }

    #[test]
    fn arrival_at_other_connector_only_updates_snapshot() {
        let events = vec![arrival("V2", "CS2", 15, Some(90))];
        let forecast = builder(4).build("GC1", &world(), &events).unwrap();
        assert_eq!(forecast.arrivals.len(), 1);

        let other = builder(4).build("GC2", &world(), &events).unwrap();
        assert_eq!(other.arrivals.len(), 1);
        assert_eq!(other.arrivals[0].arrival_idx, 1);
        assert_eq!(other.arrivals[0].depart_idx, Some(6));
    }

    #[test]
    fn double_arrival_is_an_error() {
        let events = vec![arrival("V1", "CS1", 15, None)];
        let err = builder(4).build("GC1", &world(), &events).unwrap_err();
        assert_eq!(
            err,
            StrategyError::DoubleArrival {
                vehicle_id: "V1".into(),
                start_time: at(15),
                open_idx: 0,
                timestep_idx: 1,
            }
        );
    }

    #[test]
    fn unknown_ids_are_errors() {
        let events = vec![departure("V9", 15)];
        assert_eq!(
            builder(4).build("GC1", &world(), &events),
            Err(StrategyError::UnknownVehicle("V9".into()))
        );
        assert_eq!(
            builder(4).build("GC9", &world(), &[]),
            Err(StrategyError::UnknownGridConnector("GC9".into()))
        );
        let events = vec![arrival("V2", "CS9", 15, None)];
        assert_eq!(
            builder(4).build("GC1", &world(), &events),
            Err(StrategyError::UnknownChargingStation("CS9".into()))
        );
    }
}
