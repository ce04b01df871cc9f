//! Built-in depot scenarios generated from seeded device profiles.

use std::collections::BTreeMap;

use chrono::TimeDelta;

use crate::config::{
    BatteryConfig, ChargingStationConfig, EventsConfig, GridConnectorConfig,
    GridOperatorSignalConfig, ProfileConfig, ScenarioConfig, SimulationConfig, StrategyConfig,
    VehicleConfig, VehicleEventConfig, VehicleEventType, VehicleTypeConfig,
};
use crate::devices::{BaseLoad, Device, SessionSampler, SolarPv};
use crate::sim::event::VehicleUpdate;

/// Preset names accepted by [`generate`].
pub const NAMES: &[&str] = &["baseline", "solar_depot", "tight_grid"];

/// Seed offset for the session samplers to avoid correlation with the load profile.
const SESSION_SEED_OFFSET: u64 = 57;
const SOLAR_SEED_OFFSET: u64 = 1;

const GC_ID: &str = "GC1";
const VEHICLE_TYPE: &str = "van";
const INTERVAL_MINUTES: u32 = 15;
const DAYS: usize = 2;

struct PresetParams {
    gc_max_kw: f64,
    vehicles: usize,
    station_kw: f64,
    base_kw: f64,
    amp_kw: f64,
    pv_kw_peak: Option<f64>,
    battery: Option<(f64, f64)>,
    /// Evening ceiling reduction on the second day (kW).
    evening_cap_kw: Option<f64>,
}

fn params(name: &str) -> Option<PresetParams> {
    let p = match name {
        "baseline" => PresetParams {
            gc_max_kw: 150.0,
            vehicles: 6,
            station_kw: 22.0,
            base_kw: 40.0,
            amp_kw: 15.0,
            pv_kw_peak: None,
            battery: None,
            evening_cap_kw: None,
        },
        "solar_depot" => PresetParams {
            gc_max_kw: 120.0,
            vehicles: 6,
            station_kw: 22.0,
            base_kw: 35.0,
            amp_kw: 12.0,
            pv_kw_peak: Some(80.0),
            battery: Some((100.0, 50.0)),
            evening_cap_kw: None,
        },
        "tight_grid" => PresetParams {
            gc_max_kw: 80.0,
            vehicles: 8,
            station_kw: 11.0,
            base_kw: 30.0,
            amp_kw: 10.0,
            pv_kw_peak: None,
            battery: Some((60.0, 30.0)),
            evening_cap_kw: Some(60.0),
        },
        _ => return None,
    };
    Some(p)
}

/// Generates the named preset with profiles drawn from `seed`.
///
/// Returns `None` for an unknown name.
pub fn generate(name: &str, seed: u64) -> Option<ScenarioConfig> {
    let p = params(name)?;

    let simulation = SimulationConfig {
        interval_minutes: INTERVAL_MINUTES,
        seed,
        ..SimulationConfig::default()
    };
    let steps_per_day = (24 * 60) / INTERVAL_MINUTES as usize;
    let n_intervals = DAYS * steps_per_day;
    let dt_hours = f64::from(INTERVAL_MINUTES) / 60.0;
    let interval = TimeDelta::minutes(i64::from(INTERVAL_MINUTES));
    let time_at = |step: usize| simulation.start_time + interval * step as i32;

    let mut cfg = ScenarioConfig {
        simulation: SimulationConfig {
            n_intervals,
            ..simulation.clone()
        },
        strategy: StrategyConfig::default(),
        ..ScenarioConfig::default()
    };
    cfg.grid_connectors.insert(
        GC_ID.to_string(),
        GridConnectorConfig {
            max_power_kw: p.gc_max_kw,
        },
    );
    let vehicle_type = VehicleTypeConfig {
        capacity_kwh: 60.0,
        max_charging_power_kw: p.station_kw,
        min_charging_power_kw: 0.0,
        efficiency: 0.95,
    };
    let capacity = vehicle_type.capacity_kwh;
    cfg.vehicle_types.insert(VEHICLE_TYPE.to_string(), vehicle_type);

    let mut vehicle_events = Vec::new();
    for i in 1..=p.vehicles {
        let vehicle_id = format!("V{i}");
        let cs_id = format!("CS{i}");
        cfg.charging_stations.insert(
            cs_id.clone(),
            ChargingStationConfig {
                parent: GC_ID.to_string(),
                max_power_kw: p.station_kw,
                min_power_kw: 0.0,
            },
        );
        cfg.vehicles.insert(
            vehicle_id.clone(),
            VehicleConfig {
                vehicle_type: VEHICLE_TYPE.to_string(),
                soc: 0.8,
                desired_soc: 0.8,
                connected_charging_station: None,
                estimated_time_of_departure: None,
            },
        );

        let mut sampler = SessionSampler::new(
            p.station_kw,
            (10.0, 30.0),
            (24, 56),
            steps_per_day,
            dt_hours,
            seed.wrapping_add(SESSION_SEED_OFFSET + i as u64),
        );
        let mut last_departure = None;
        for session in sampler.sample_days(DAYS) {
            // a vehicle must leave before it can plug in again
            let arrival = match last_departure {
                Some(d) => session.arrival_step.max(d + 1),
                None => session.arrival_step,
            };
            if arrival >= session.departure_step {
                continue;
            }
            let departure_time = time_at(session.departure_step);
            vehicle_events.push(VehicleEventConfig {
                signal_time: None,
                start_time: time_at(arrival),
                vehicle_id: vehicle_id.clone(),
                event_type: VehicleEventType::Arrival,
                update: VehicleUpdate {
                    connected_charging_station: Some(cs_id.clone()),
                    estimated_time_of_departure: Some(departure_time),
                    desired_soc: None,
                    soc_delta: -session.demand_kwh / capacity,
                },
            });
            vehicle_events.push(VehicleEventConfig {
                signal_time: None,
                start_time: departure_time,
                vehicle_id: vehicle_id.clone(),
                event_type: VehicleEventType::Departure,
                update: VehicleUpdate::default(),
            });
            last_departure = Some(session.departure_step);
        }
    }

    let mut load = BaseLoad::new(p.base_kw, p.amp_kw, 1.2, 2.0, steps_per_day, seed);
    let mut fixed_loads = BTreeMap::new();
    fixed_loads.insert(
        "building".to_string(),
        profile(&simulation, load.profile(n_intervals)),
    );

    let mut local_generation = BTreeMap::new();
    if let Some(kw_peak) = p.pv_kw_peak {
        let mut pv = SolarPv::new(
            kw_peak,
            steps_per_day / 4,
            steps_per_day * 19 / 24,
            0.05,
            steps_per_day,
            seed.wrapping_add(SOLAR_SEED_OFFSET),
        );
        let values = pv.profile(n_intervals).into_iter().map(|kw| -kw).collect();
        local_generation.insert("pv".to_string(), profile(&simulation, values));
    }

    if let Some((capacity_kwh, max_power_kw)) = p.battery {
        cfg.batteries.insert(
            "B1".to_string(),
            BatteryConfig {
                parent: GC_ID.to_string(),
                capacity_kwh,
                max_power_kw,
                min_charging_power_kw: 1.0,
                soc: 0.5,
                efficiency: 0.95,
            },
        );
    }

    let mut grid_operator_signals = Vec::new();
    if let Some(cap) = p.evening_cap_kw {
        // second day, 17:00 to 21:00, announced one hour ahead
        let from = steps_per_day + steps_per_day * 17 / 24;
        let to = steps_per_day + steps_per_day * 21 / 24;
        let notice = steps_per_day / 24;
        for (step, max_power_kw) in [(from, cap), (to, p.gc_max_kw)] {
            grid_operator_signals.push(GridOperatorSignalConfig {
                signal_time: Some(time_at(step - notice)),
                start_time: time_at(step),
                grid_connector_id: GC_ID.to_string(),
                max_power_kw: Some(max_power_kw),
            });
        }
    }

    cfg.events = EventsConfig {
        vehicle_events,
        grid_operator_signals,
        fixed_loads,
        local_generation,
    };
    Some(cfg)
}

fn profile(simulation: &SimulationConfig, values_kw: Vec<f64>) -> ProfileConfig {
    ProfileConfig {
        grid_connector_id: GC_ID.to_string(),
        start_time: simulation.start_time,
        signal_time: None,
        step_duration_minutes: simulation.interval_minutes,
        values_kw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_yields_none() {
        assert!(generate("nope", 1).is_none());
    }

    #[test]
    fn same_seed_same_scenario() {
        for name in NAMES {
            assert_eq!(generate(name, 9), generate(name, 9), "{name}");
        }
    }

    #[test]
    fn different_seed_changes_profiles() {
        let a = generate("baseline", 1).unwrap();
        let b = generate("baseline", 2).unwrap();
        assert_ne!(
            a.events.fixed_loads["building"].values_kw,
            b.events.fixed_loads["building"].values_kw
        );
    }

    #[test]
    fn vehicles_alternate_between_arrival_and_departure() {
        let cfg = generate("tight_grid", 5).unwrap();
        for vehicle_id in cfg.vehicles.keys() {
            let kinds: Vec<_> = cfg
                .events
                .vehicle_events
                .iter()
                .filter(|e| &e.vehicle_id == vehicle_id)
                .collect();
            assert!(!kinds.is_empty());
            for pair in kinds.windows(2) {
                assert_ne!(pair[0].event_type, pair[1].event_type);
                assert!(pair[0].start_time < pair[1].start_time);
            }
        }
    }

    #[test]
    fn profiles_cover_the_whole_run() {
        let cfg = generate("solar_depot", 3).unwrap();
        let n = cfg.simulation.n_intervals;
        assert_eq!(cfg.events.fixed_loads["building"].values_kw.len(), n);
        let pv = &cfg.events.local_generation["pv"].values_kw;
        assert_eq!(pv.len(), n);
        assert!(pv.iter().all(|kw| *kw >= 0.0));
        assert!(pv.iter().any(|kw| *kw > 0.0));
    }
}
