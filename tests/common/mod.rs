//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use peakshave_sim::devices::{ChargingStation, Vehicle, VehicleType};
use peakshave_sim::sim::event::{Event, EventKind, VehicleAction, VehicleUpdate};
use peakshave_sim::sim::grid_connector::GridConnector;
use peakshave_sim::sim::types::SimConfig;
use peakshave_sim::sim::world::WorldState;

/// Simulation start used by every fixture: 2023-01-02 00:00.
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 2)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

pub fn at(minutes: i64) -> NaiveDateTime {
    t0() + TimeDelta::minutes(minutes)
}

/// 15-minute steps starting at [`t0`].
pub fn quarter_hour_config(n_intervals: usize) -> SimConfig {
    SimConfig::new(t0(), 15, n_intervals, 42)
}

/// 100 kWh van charging at up to 22 kW, lossless.
pub fn van() -> VehicleType {
    VehicleType {
        capacity: 100.0,
        max_charging_power: 22.0,
        min_charging_power: 0.0,
        efficiency: 1.0,
    }
}

/// One connector `GC1` with `stations` 22 kW stations `CS1..`.
pub fn depot(max_power: f64, stations: usize) -> WorldState {
    let mut w = WorldState::default();
    w.grid_connectors
        .insert("GC1".into(), GridConnector::new(max_power));
    for i in 1..=stations {
        w.charging_stations
            .insert(format!("CS{i}"), ChargingStation::new("GC1", 0.0, 22.0));
    }
    w
}

/// Adds a van plugged into `station` that leaves at `departure`.
pub fn plug_in(
    world: &mut WorldState,
    vehicle_id: &str,
    station: &str,
    soc: f64,
    desired_soc: f64,
    departure: NaiveDateTime,
) {
    world.vehicles.insert(
        vehicle_id.into(),
        Vehicle::new(van(), soc, desired_soc).connect(station, Some(departure)),
    );
}

pub fn fixed_load(start: NaiveDateTime, value: f64) -> Event {
    Event::at(
        start,
        EventKind::FixedLoad {
            grid_connector_id: "GC1".into(),
            name: "building".into(),
            value,
        },
    )
}

pub fn arrival(
    start: NaiveDateTime,
    vehicle_id: &str,
    station: &str,
    departure: NaiveDateTime,
) -> Event {
    Event::at(
        start,
        EventKind::Vehicle {
            vehicle_id: vehicle_id.into(),
            action: VehicleAction::Arrival(VehicleUpdate {
                connected_charging_station: Some(station.into()),
                estimated_time_of_departure: Some(departure),
                ..VehicleUpdate::default()
            }),
        },
    )
}

pub fn departure(start: NaiveDateTime, vehicle_id: &str) -> Event {
    Event::at(
        start,
        EventKind::Vehicle {
            vehicle_id: vehicle_id.into(),
            action: VehicleAction::Departure,
        },
    )
}
