//! Peak-shaving strategy: levels vehicle charging against the projected
//! connector load and uses stationary batteries to flatten what remains.
//!
//! Per step and grid connector:
//! 1. build the [`Forecast`] over the horizon,
//! 2. schedule every standing vehicle with the fill algorithm, shortest
//!    standing time first,
//! 3. apply the scheduled power to the vehicles plugged in now,
//! 4. balance the connector with its stationary batteries.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use crate::devices::{ChargingStation, Vehicle};
use crate::forecast::{Forecast, ForecastBuilder, ForecastVehicle, TimestepInfo, VehicleArrival};
use crate::sim::event::{Event, signal_in_advance};
use crate::sim::grid_connector::GridConnector;
use crate::sim::types::{SimConfig, StepCommands};
use crate::sim::world::WorldState;

use super::{Strategy, StrategyError, balancer, clamp_power, fill::fill};

/// Longest accepted lookahead: one week.
pub const MAX_HORIZON_HOURS: u32 = 7 * 24;

/// Tuning of [`PeakShaving`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakShavingOptions {
    /// Lookahead in hours.
    pub horizon_hours: u32,
    /// Make every event known one horizon before it starts.
    pub perfect_foresight: bool,
}

impl Default for PeakShavingOptions {
    fn default() -> Self {
        Self {
            horizon_hours: 24,
            perfect_foresight: true,
        }
    }
}

/// A vehicle's plan for the current step.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledVehicle {
    pub vehicle_id: String,
    pub charging_station_id: String,
    pub vehicle: ForecastVehicle,
    pub arrival_idx: usize,
    /// Departure index, truncated to the horizon.
    pub depart_idx: usize,
    /// Energy (kWh) planned within the visible part of the standing window.
    pub energy_needed: f64,
    /// Requested power (kW) for the current step.
    pub command: f64,
}

/// Fraction of the standing window `[arrival_idx, depart_idx)` that lies
/// within a horizon of `horizon` steps.
pub fn visible_fraction(arrival_idx: usize, depart_idx: usize, horizon: usize) -> f64 {
    if depart_idx <= horizon {
        return 1.0;
    }
    horizon.saturating_sub(arrival_idx) as f64 / (depart_idx - arrival_idx) as f64
}

/// Schedules the standing vehicles of one connector.
///
/// Vehicles without a departure estimate or without standing time are
/// skipped. The rest are filled in order of their visible standing time,
/// shortest first, each one raising the projected load seen by the next.
///
/// # Errors
///
/// [`StrategyError::UnknownChargingStation`] if a record points at a
/// missing station.
pub fn schedule_vehicles(
    arrivals: Vec<VehicleArrival>,
    timesteps: &mut [TimestepInfo],
    stations: &BTreeMap<String, ChargingStation>,
    dt_hours: f64,
) -> Result<Vec<ScheduledVehicle>, StrategyError> {
    let horizon = timesteps.len();
    let mut standing: Vec<(VehicleArrival, usize)> = arrivals
        .into_iter()
        .filter_map(|a| match a.depart_idx {
            Some(depart_idx) if a.arrival_idx < depart_idx => Some((a, depart_idx)),
            _ => None,
        })
        .collect();
    standing.sort_by_key(|(a, depart_idx)| (*depart_idx).min(horizon).saturating_sub(a.arrival_idx));

    let mut scheduled = Vec::with_capacity(standing.len());
    for (arrival, depart_idx) in standing {
        let VehicleArrival {
            vehicle_id,
            charging_station_id,
            mut vehicle,
            arrival_idx,
            ..
        } = arrival;

        let mut energy_needed = vehicle.energy_needed();
        let mut depart_idx = depart_idx;
        if depart_idx > horizon {
            let f = visible_fraction(arrival_idx, depart_idx, horizon);
            energy_needed *= f;
            vehicle.desired_soc =
                vehicle.battery.soc + f * (vehicle.desired_soc - vehicle.battery.soc);
            depart_idx = horizon;
        }

        let station = stations
            .get(&charging_station_id)
            .ok_or_else(|| StrategyError::UnknownChargingStation(charging_station_id.clone()))?;
        let command = fill(
            arrival_idx..depart_idx,
            energy_needed,
            timesteps,
            &mut vehicle,
            station,
            dt_hours,
        );

        scheduled.push(ScheduledVehicle {
            vehicle_id,
            charging_station_id,
            vehicle,
            arrival_idx,
            depart_idx,
            energy_needed,
            command,
        });
    }
    Ok(scheduled)
}

/// Charges the vehicles plugged in now with their scheduled power plus any
/// net generation projected for the current step, and records the power
/// on the connector.
///
/// # Returns
///
/// Charging-station id to recorded power (kW), for stations that draw power.
pub fn allocate_surplus(
    scheduled: &[ScheduledVehicle],
    current: &TimestepInfo,
    gc: &mut GridConnector,
    vehicles: &mut BTreeMap<String, Vehicle>,
    stations: &BTreeMap<String, ChargingStation>,
    dt_hours: f64,
) -> Result<BTreeMap<String, f64>, StrategyError> {
    let surplus = -current.cur_power.min(0.0);
    let mut commands = BTreeMap::new();

    for plan in scheduled.iter().filter(|s| s.arrival_idx == 0) {
        let station = stations
            .get(&plan.charging_station_id)
            .ok_or_else(|| StrategyError::UnknownChargingStation(plan.charging_station_id.clone()))?;
        let vehicle = vehicles
            .get_mut(&plan.vehicle_id)
            .ok_or_else(|| StrategyError::UnknownVehicle(plan.vehicle_id.clone()))?;

        let power = clamp_power(plan.command + surplus, &vehicle.vehicle_type, station);
        if power <= 0.0 {
            continue;
        }
        let avg_power = vehicle.battery.load(dt_hours, power).avg_power;
        commands.insert(
            plan.charging_station_id.clone(),
            gc.add_load(&plan.charging_station_id, avg_power),
        );
    }
    Ok(commands)
}

/// Peak-shaving charging strategy.
#[derive(Debug, Clone)]
pub struct PeakShaving {
    interval: TimeDelta,
    dt_hours: f64,
    horizon_steps: usize,
    perfect_foresight: bool,
    /// All events sorted by start time, signalled one horizon ahead.
    events: Vec<Event>,
    /// Index of the first event that has not started yet.
    cursor: usize,
}

impl PeakShaving {
    /// Creates the strategy.
    ///
    /// With perfect foresight, a private copy of `events` is moved one horizon
    /// ahead (see [`signal_in_advance`]); otherwise the strategy reads the
    /// world's future events.
    ///
    /// # Panics
    ///
    /// Panics if `options.horizon_hours` is zero or above [`MAX_HORIZON_HOURS`].
    pub fn new(config: &SimConfig, options: PeakShavingOptions, events: &[Event]) -> Self {
        assert!(
            (1..=MAX_HORIZON_HOURS).contains(&options.horizon_hours),
            "horizon_hours must be in 1..={MAX_HORIZON_HOURS}"
        );
        let horizon = TimeDelta::hours(i64::from(options.horizon_hours));
        let horizon_steps =
            (horizon.num_minutes() / i64::from(config.interval_minutes)).max(1) as usize;

        let mut own_events = Vec::new();
        if options.perfect_foresight {
            own_events = events.to_vec();
            let changed = signal_in_advance(&mut own_events, horizon, config.start_time);
            if changed > 0 {
                info!(changed, "events signalled earlier");
            }
        }

        Self {
            interval: config.interval(),
            dt_hours: config.dt_hours(),
            horizon_steps,
            perfect_foresight: options.perfect_foresight,
            events: own_events,
            cursor: 0,
        }
    }

    pub fn horizon_steps(&self) -> usize {
        self.horizon_steps
    }

    /// Runs the strategy for one connector. Expects `cursor` to be at `now`.
    ///
    /// # Returns
    ///
    /// The charging-station commands of this connector.
    fn step_gc(
        &self,
        gc_id: &str,
        world: &mut WorldState,
        now: NaiveDateTime,
    ) -> Result<BTreeMap<String, f64>, StrategyError> {
        let events = if self.perfect_foresight {
            &self.events[self.cursor..]
        } else {
            world.future_events.as_slice()
        };
        let Forecast {
            mut timesteps,
            arrivals,
        } = ForecastBuilder::new(now, self.interval, self.horizon_steps).build(gc_id, world, events)?;

        let WorldState {
            grid_connectors,
            charging_stations,
            vehicles,
            batteries,
            ..
        } = world;
        let gc = grid_connectors
            .get_mut(gc_id)
            .ok_or_else(|| StrategyError::UnknownGridConnector(gc_id.to_string()))?;

        let scheduled =
            schedule_vehicles(arrivals, &mut timesteps, charging_stations, self.dt_hours)?;

        let commands = match timesteps.first() {
            Some(current) => allocate_surplus(
                &scheduled,
                current,
                gc,
                vehicles,
                charging_stations,
                self.dt_hours,
            )?,
            None => BTreeMap::new(),
        };

        let battery_power = balancer::balance(gc_id, gc, batteries, &mut timesteps, self.dt_hours);

        debug!(
            gc = gc_id,
            vehicles = scheduled.len(),
            charging = commands.len(),
            batteries_kw = battery_power.values().sum::<f64>(),
            load_kw = gc.get_current_load(),
            "peak shaving step"
        );
        Ok(commands)
    }
}

impl Strategy for PeakShaving {
    fn step(
        &mut self,
        world: &mut WorldState,
        now: NaiveDateTime,
    ) -> Result<StepCommands, StrategyError> {
        if self.perfect_foresight {
            while self
                .events
                .get(self.cursor)
                .is_some_and(|e| e.start_time <= now)
            {
                self.cursor += 1;
            }
        }

        let mut commands = StepCommands::new(now);
        let gc_ids: Vec<String> = world.grid_connectors.keys().cloned().collect();
        for gc_id in &gc_ids {
            commands.commands.extend(self.step_gc(gc_id, world, now)?);
        }
        Ok(commands)
    }

    fn description(&self) -> &'static str {
        "Peak Shaving"
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::devices::{Battery, StationaryBattery, VehicleType};
    use crate::sim::event::{EventKind, VehicleAction, VehicleUpdate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    fn at(minutes: i64) -> NaiveDateTime {
        t0() + TimeDelta::minutes(minutes)
    }

    fn vt() -> VehicleType {
        VehicleType {
            capacity: 100.0,
            max_charging_power: 50.0,
            min_charging_power: 0.0,
            efficiency: 1.0,
        }
    }

    fn timesteps(n: usize) -> Vec<TimestepInfo> {
        vec![
            TimestepInfo {
                max_power: 1000.0,
                cur_power: 0.0,
                vehicles: BTreeMap::new(),
            };
            n
        ]
    }

    fn record(id: &str, soc: f64, arrival_idx: usize, depart_idx: Option<usize>) -> VehicleArrival {
        VehicleArrival {
            vehicle_id: id.into(),
            charging_station_id: format!("CS-{id}"),
            vehicle: ForecastVehicle::from(&Vehicle::new(vt(), soc, 1.0)),
            arrival_idx,
            depart_idx,
        }
    }

    fn stations(ids: &[&str]) -> BTreeMap<String, ChargingStation> {
        ids.iter()
            .map(|id| (format!("CS-{id}"), ChargingStation::new("GC1", 0.0, 50.0)))
            .collect()
    }

    fn world() -> WorldState {
        let mut w = WorldState::default();
        w.grid_connectors
            .insert("GC1".into(), GridConnector::new(100.0));
        w.charging_stations
            .insert("CS1".into(), ChargingStation::new("GC1", 0.0, 50.0));
        w.vehicles.insert(
            "V1".into(),
            Vehicle::new(vt(), 0.5, 0.6).connect("CS1", Some(at(60))),
        );
        w
    }

    fn config() -> SimConfig {
        SimConfig::new(t0(), 15, 96, 0)
    }

    #[test]
    fn visible_fraction_of_long_stays() {
        assert_eq!(visible_fraction(0, 4, 8), 1.0);
        assert_eq!(visible_fraction(2, 12, 8), 0.6);
    }

    #[test]
    fn unplannable_vehicles_are_skipped() {
        let arrivals = vec![
            record("A", 0.5, 0, None),
            record("B", 0.5, 3, Some(3)),
            record("C", 0.5, 0, Some(2)),
        ];
        let mut ts = timesteps(4);
        let out = schedule_vehicles(arrivals, &mut ts, &stations(&["A", "B", "C"]), 0.25).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].vehicle_id, "C");
    }

    #[test]
    fn shortest_standing_time_goes_first() {
        // long stays 10 steps but only 4 are visible; short stays 2
        let arrivals = vec![record("long", 0.9, 0, Some(10)), record("short", 0.9, 0, Some(2))];
        let mut ts = timesteps(4);
        let out = schedule_vehicles(arrivals, &mut ts, &stations(&["long", "short"]), 1.0).unwrap();

        assert_eq!(out[0].vehicle_id, "short");
        // short needs 10 kWh over 2 h on an empty connector
        assert_abs_diff_eq!(out[0].command, 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out[0].energy_needed, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn short_vehicle_is_unaffected_by_long_one() {
        let alone = schedule_vehicles(
            vec![record("short", 0.9, 0, Some(2))],
            &mut timesteps(4),
            &stations(&["short"]),
            1.0,
        )
        .unwrap();
        let shared = schedule_vehicles(
            vec![record("long", 0.5, 0, Some(10)), record("short", 0.9, 0, Some(2))],
            &mut timesteps(4),
            &stations(&["long", "short"]),
            1.0,
        )
        .unwrap();
        let short = shared.iter().find(|s| s.vehicle_id == "short").unwrap();
        assert_eq!(short.command, alone[0].command);
        assert_eq!(short.energy_needed, alone[0].energy_needed);
    }

    #[test]
    fn need_beyond_horizon_is_scaled() {
        let mut ts = timesteps(4);
        let out = schedule_vehicles(
            vec![record("V", 0.5, 1, Some(9))],
            &mut ts,
            &stations(&["V"]),
            1.0,
        )
        .unwrap();
        // 50 kWh missing, 3 of 8 standing steps visible
        assert_abs_diff_eq!(out[0].energy_needed, 50.0 * 3.0 / 8.0, epsilon = 1e-9);
        assert_eq!(out[0].depart_idx, 4);
        assert_abs_diff_eq!(out[0].vehicle.desired_soc, 0.5 + 0.5 * 3.0 / 8.0, epsilon = 1e-9);
    }

    #[test]
    fn surplus_is_added_to_current_vehicles() {
        let mut w = world();
        let scheduled = vec![ScheduledVehicle {
            vehicle_id: "V1".into(),
            charging_station_id: "CS1".into(),
            vehicle: ForecastVehicle::from(&w.vehicles["V1"]),
            arrival_idx: 0,
            depart_idx: 4,
            energy_needed: 10.0,
            command: 10.0,
        }];
        let current = TimestepInfo {
            max_power: 100.0,
            cur_power: -5.0,
            vehicles: BTreeMap::new(),
        };
        let WorldState {
            grid_connectors,
            charging_stations,
            vehicles,
            ..
        } = &mut w;
        let gc = grid_connectors.get_mut("GC1").unwrap();
        let out =
            allocate_surplus(&scheduled, &current, gc, vehicles, charging_stations, 0.25).unwrap();

        assert_eq!(out["CS1"], 15.0);
        assert_eq!(gc.current_loads["CS1"], 15.0);
        assert_abs_diff_eq!(w.vehicles["V1"].battery.soc, 0.5 + 15.0 * 0.25 / 100.0, epsilon = 1e-9);
    }

    #[test]
    fn future_arrivals_get_no_surplus() {
        let mut w = world();
        let scheduled = vec![ScheduledVehicle {
            vehicle_id: "V1".into(),
            charging_station_id: "CS1".into(),
            vehicle: ForecastVehicle::from(&w.vehicles["V1"]),
            arrival_idx: 1,
            depart_idx: 4,
            energy_needed: 10.0,
            command: 0.0,
        }];
        let current = TimestepInfo {
            max_power: 100.0,
            cur_power: -5.0,
            vehicles: BTreeMap::new(),
        };
        let WorldState {
            grid_connectors,
            charging_stations,
            vehicles,
            ..
        } = &mut w;
        let gc = grid_connectors.get_mut("GC1").unwrap();
        let out =
            allocate_surplus(&scheduled, &current, gc, vehicles, charging_stations, 0.25).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    #[should_panic(expected = "horizon_hours")]
    fn oversized_horizon_panics() {
        let options = PeakShavingOptions {
            horizon_hours: u32::MAX,
            perfect_foresight: true,
        };
        PeakShaving::new(&config(), options, &[]);
    }

    #[test]
    fn step_spreads_charging_over_the_window() {
        let mut w = world();
        let mut strategy = PeakShaving::new(&config(), PeakShavingOptions::default(), &[]);
        let cmds = strategy.step(&mut w, t0()).unwrap();

        // 10 kWh over four 15 minute steps
        assert_abs_diff_eq!(cmds.commands["CS1"], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(w.grid_connectors["GC1"].get_current_load(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn battery_flattens_against_future_load() {
        let mut w = world();
        w.vehicles.clear();
        w.grid_connectors
            .get_mut("GC1")
            .unwrap()
            .set_load("building", 40.0);
        w.batteries.insert(
            "B1".into(),
            StationaryBattery::new("GC1", 0.0, Battery::new(200.0, 0.5, 100.0, 1.0)),
        );
        // the building load drops to 0 after the first hour
        let events = vec![Event::at(
            at(60),
            EventKind::FixedLoad {
                grid_connector_id: "GC1".into(),
                name: "building".into(),
                value: 0.0,
            },
        )];
        let options = PeakShavingOptions {
            horizon_hours: 2,
            perfect_foresight: true,
        };
        let mut strategy = PeakShaving::new(&config(), options, &events);
        assert_eq!(strategy.horizon_steps(), 8);
        strategy.step(&mut w, t0()).unwrap();

        // average over [40, 40, 40, 40, 0, 0, 0, 0] is 20
        assert_abs_diff_eq!(w.grid_connectors["GC1"].current_loads["B1"], -20.0, epsilon = 1e-9);
    }

    #[test]
    fn double_arrival_aborts_the_step() {
        let mut w = world();
        let events = vec![Event::at(
            at(15),
            EventKind::Vehicle {
                vehicle_id: "V1".into(),
                action: VehicleAction::Arrival(VehicleUpdate {
                    connected_charging_station: Some("CS1".into()),
                    ..VehicleUpdate::default()
                }),
            },
        )];
        let mut strategy = PeakShaving::new(&config(), PeakShavingOptions::default(), &events);
        let err = strategy.step(&mut w, t0()).unwrap_err();
        assert!(matches!(err, StrategyError::DoubleArrival { timestep_idx: 1, .. }));
    }

    #[test]
    fn started_events_are_skipped_with_foresight() {
        let mut w = world();
        let events = vec![Event::at(
            at(0),
            EventKind::Vehicle {
                vehicle_id: "V1".into(),
                action: VehicleAction::Arrival(VehicleUpdate {
                    connected_charging_station: Some("CS1".into()),
                    ..VehicleUpdate::default()
                }),
            },
        )];
        let mut strategy = PeakShaving::new(&config(), PeakShavingOptions::default(), &events);
        // the arrival at t0 already took effect on the world
        assert!(strategy.step(&mut w, t0()).is_ok());
    }

    #[test]
    fn live_queue_is_used_without_foresight() {
        let mut w = world();
        w.future_events.push(Event::at(
            at(30),
            EventKind::FixedLoad {
                grid_connector_id: "GC1".into(),
                name: "building".into(),
                value: 100.0,
            },
        ));
        let options = PeakShavingOptions {
            horizon_hours: 24,
            perfect_foresight: false,
        };
        let mut strategy = PeakShaving::new(&config(), options, &[]);
        let cmds = strategy.step(&mut w, t0()).unwrap();
        // the building takes 100 kW from the second half hour on: 10 kWh in 30 minutes
        assert_abs_diff_eq!(cmds.commands["CS1"], 20.0, epsilon = 1e-9);
    }
}
