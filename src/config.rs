//! TOML-based scenario configuration, validation and world construction.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::devices::{Battery, ChargingStation, StationaryBattery, Vehicle, VehicleType};
use crate::presets;
use crate::sim::event::{Event, EventKind, VehicleAction, VehicleUpdate};
use crate::sim::grid_connector::GridConnector;
use crate::sim::types::SimConfig;
use crate::sim::world::WorldState;
use crate::strategy::peak_shaving::MAX_HORIZON_HOURS;

/// Top-level scenario configuration parsed from TOML.
///
/// Entity tables are keyed by id. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::from_preset`]
/// for a built-in scenario.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Strategy selection and tuning.
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub grid_connectors: BTreeMap<String, GridConnectorConfig>,
    #[serde(default)]
    pub charging_stations: BTreeMap<String, ChargingStationConfig>,
    #[serde(default)]
    pub vehicle_types: BTreeMap<String, VehicleTypeConfig>,
    #[serde(default)]
    pub vehicles: BTreeMap<String, VehicleConfig>,
    /// Stationary batteries.
    #[serde(default)]
    pub batteries: BTreeMap<String, BatteryConfig>,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Start of the first step, e.g. `"2023-01-02T00:00:00"`.
    pub start_time: NaiveDateTime,
    /// Step length in minutes (must be > 0).
    pub interval_minutes: u32,
    /// Number of steps to simulate (must be > 0).
    pub n_intervals: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: NaiveDate::from_ymd_opt(2023, 1, 2)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            interval_minutes: 15,
            n_intervals: 96,
            seed: 42,
        }
    }
}

/// Strategy selection and tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    /// Strategy type: `"peak_shaving"` or `"greedy"`.
    pub name: String,
    /// Lookahead of the peak-shaving strategy in hours (1 to one week).
    pub horizon_hours: u32,
    /// Make every event known one horizon ahead.
    pub perfect_foresight: bool,
}

impl StrategyConfig {
    pub const NAMES: &[&str] = &["peak_shaving", "greedy"];
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "peak_shaving".to_string(),
            horizon_hours: 24,
            perfect_foresight: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GridConnectorConfig {
    /// Connection ceiling (kW).
    pub max_power_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChargingStationConfig {
    /// Parent grid connector id.
    pub parent: String,
    pub max_power_kw: f64,
    #[serde(default)]
    pub min_power_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleTypeConfig {
    pub capacity_kwh: f64,
    pub max_charging_power_kw: f64,
    #[serde(default)]
    pub min_charging_power_kw: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleConfig {
    /// Vehicle type id.
    pub vehicle_type: String,
    /// Initial state of charge (0.0–1.0).
    pub soc: f64,
    pub desired_soc: f64,
    /// Station the vehicle is plugged into at the start, if any.
    #[serde(default)]
    pub connected_charging_station: Option<String>,
    #[serde(default)]
    pub estimated_time_of_departure: Option<NaiveDateTime>,
}

/// Stationary battery parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryConfig {
    /// Parent grid connector id.
    pub parent: String,
    pub capacity_kwh: f64,
    /// Charge and discharge power limit (kW).
    pub max_power_kw: f64,
    /// Deviations below this power (kW) leave the battery idle.
    #[serde(default)]
    pub min_charging_power_kw: f64,
    #[serde(default = "default_soc")]
    pub soc: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
}

fn default_efficiency() -> f64 {
    0.95
}

fn default_soc() -> f64 {
    0.5
}

/// Every timed input of the scenario.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    pub vehicle_events: Vec<VehicleEventConfig>,
    pub grid_operator_signals: Vec<GridOperatorSignalConfig>,
    /// Fixed-load profiles keyed by load component name.
    pub fixed_loads: BTreeMap<String, ProfileConfig>,
    /// Generation profiles keyed by component name; values are positive.
    pub local_generation: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleEventType {
    Arrival,
    Departure,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleEventConfig {
    /// When the event becomes known; defaults to `start_time`.
    #[serde(default)]
    pub signal_time: Option<NaiveDateTime>,
    pub start_time: NaiveDateTime,
    pub vehicle_id: String,
    pub event_type: VehicleEventType,
    /// Arrival payload; ignored for departures.
    #[serde(default)]
    pub update: VehicleUpdate,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GridOperatorSignalConfig {
    #[serde(default)]
    pub signal_time: Option<NaiveDateTime>,
    pub start_time: NaiveDateTime,
    pub grid_connector_id: String,
    /// New ceiling (kW); absent leaves the ceiling unchanged.
    #[serde(default)]
    pub max_power_kw: Option<f64>,
}

/// An equidistant power profile on one grid connector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub grid_connector_id: String,
    /// Start of the first value.
    pub start_time: NaiveDateTime,
    /// When the whole profile becomes known; defaults to `start_time`.
    #[serde(default)]
    pub signal_time: Option<NaiveDateTime>,
    /// Duration of each value in minutes.
    pub step_duration_minutes: u32,
    pub values_kw: Vec<f64>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"vehicles.V1.soc"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Everything an [`Engine`](crate::sim::engine::Engine) needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub sim: SimConfig,
    pub strategy: StrategyConfig,
    pub world: WorldState,
    pub events: Vec<Event>,
}

impl ScenarioConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = presets::NAMES;

    /// Loads a scenario from a named preset with the default seed.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        Self::from_preset_seeded(name, SimulationConfig::default().seed)
    }

    /// Loads a scenario from a named preset, generating its profiles from
    /// `seed`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset_seeded(name: &str, seed: u64) -> Result<Self, ConfigError> {
        presets::generate(name, seed).ok_or_else(|| {
            ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )
        })
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.interval_minutes == 0 {
            errors.push(ConfigError::new("simulation.interval_minutes", "must be > 0"));
        }
        if s.n_intervals == 0 {
            errors.push(ConfigError::new("simulation.n_intervals", "must be > 0"));
        }

        let st = &self.strategy;
        if !StrategyConfig::NAMES.contains(&st.name.as_str()) {
            errors.push(ConfigError::new(
                "strategy.name",
                format!(
                    "must be one of {}, got \"{}\"",
                    StrategyConfig::NAMES.join(", "),
                    st.name
                ),
            ));
        }
        if !(1..=MAX_HORIZON_HOURS).contains(&st.horizon_hours) {
            errors.push(ConfigError::new(
                "strategy.horizon_hours",
                format!("must be in [1, {MAX_HORIZON_HOURS}]"),
            ));
        }

        if self.grid_connectors.is_empty() {
            errors.push(ConfigError::new("grid_connectors", "at least one is required"));
        }
        for (id, gc) in &self.grid_connectors {
            if gc.max_power_kw < 0.0 {
                errors.push(ConfigError::new(
                    format!("grid_connectors.{id}.max_power_kw"),
                    "must be >= 0",
                ));
            }
        }

        for (id, cs) in &self.charging_stations {
            self.check_grid_connector(&mut errors, format!("charging_stations.{id}.parent"), &cs.parent);
            if cs.min_power_kw < 0.0 || cs.min_power_kw > cs.max_power_kw {
                errors.push(ConfigError::new(
                    format!("charging_stations.{id}.min_power_kw"),
                    "must be in [0, max_power_kw]",
                ));
            }
        }

        for (id, vt) in &self.vehicle_types {
            let field = |name: &str| format!("vehicle_types.{id}.{name}");
            if vt.capacity_kwh <= 0.0 {
                errors.push(ConfigError::new(field("capacity_kwh"), "must be > 0"));
            }
            if vt.max_charging_power_kw < 0.0 {
                errors.push(ConfigError::new(field("max_charging_power_kw"), "must be >= 0"));
            }
            if vt.min_charging_power_kw < 0.0 {
                errors.push(ConfigError::new(field("min_charging_power_kw"), "must be >= 0"));
            }
            check_efficiency(&mut errors, field("efficiency"), vt.efficiency);
        }

        for (id, v) in &self.vehicles {
            let field = |name: &str| format!("vehicles.{id}.{name}");
            if !self.vehicle_types.contains_key(&v.vehicle_type) {
                errors.push(ConfigError::new(
                    field("vehicle_type"),
                    format!("unknown vehicle type \"{}\"", v.vehicle_type),
                ));
            }
            check_fraction(&mut errors, field("soc"), v.soc);
            check_fraction(&mut errors, field("desired_soc"), v.desired_soc);
            if let Some(cs) = &v.connected_charging_station {
                self.check_charging_station(&mut errors, field("connected_charging_station"), cs);
            }
        }

        for (id, b) in &self.batteries {
            let field = |name: &str| format!("batteries.{id}.{name}");
            self.check_grid_connector(&mut errors, field("parent"), &b.parent);
            if b.capacity_kwh <= 0.0 {
                errors.push(ConfigError::new(field("capacity_kwh"), "must be > 0"));
            }
            if b.max_power_kw < 0.0 {
                errors.push(ConfigError::new(field("max_power_kw"), "must be >= 0"));
            }
            check_fraction(&mut errors, field("soc"), b.soc);
            check_efficiency(&mut errors, field("efficiency"), b.efficiency);
        }

        self.validate_events(&mut errors);
        errors
    }

    fn validate_events(&self, errors: &mut Vec<ConfigError>) {
        for (i, ev) in self.events.vehicle_events.iter().enumerate() {
            let field = |name: &str| format!("events.vehicle_events[{i}].{name}");
            if !self.vehicles.contains_key(&ev.vehicle_id) {
                errors.push(ConfigError::new(
                    field("vehicle_id"),
                    format!("unknown vehicle \"{}\"", ev.vehicle_id),
                ));
            }
            check_signal(errors, field("signal_time"), ev.signal_time, ev.start_time);
            if ev.event_type == VehicleEventType::Arrival {
                if let Some(cs) = &ev.update.connected_charging_station {
                    self.check_charging_station(errors, field("update.connected_charging_station"), cs);
                }
                if let Some(desired) = ev.update.desired_soc {
                    check_fraction(errors, field("update.desired_soc"), desired);
                }
            }
        }

        for (i, sig) in self.events.grid_operator_signals.iter().enumerate() {
            let field = |name: &str| format!("events.grid_operator_signals[{i}].{name}");
            self.check_grid_connector(errors, field("grid_connector_id"), &sig.grid_connector_id);
            check_signal(errors, field("signal_time"), sig.signal_time, sig.start_time);
            if sig.max_power_kw.is_some_and(|p| p < 0.0) {
                errors.push(ConfigError::new(field("max_power_kw"), "must be >= 0"));
            }
        }

        let profiles = [
            ("fixed_loads", &self.events.fixed_loads),
            ("local_generation", &self.events.local_generation),
        ];
        for (section, table) in profiles {
            for (name, p) in table {
                let field = |f: &str| format!("events.{section}.{name}.{f}");
                self.check_grid_connector(errors, field("grid_connector_id"), &p.grid_connector_id);
                check_signal(errors, field("signal_time"), p.signal_time, p.start_time);
                if p.step_duration_minutes == 0 {
                    errors.push(ConfigError::new(field("step_duration_minutes"), "must be > 0"));
                }
                if section == "local_generation" && p.values_kw.iter().any(|v| *v < 0.0) {
                    errors.push(ConfigError::new(field("values_kw"), "must be >= 0"));
                }
            }
        }
    }

    fn check_grid_connector(&self, errors: &mut Vec<ConfigError>, field: String, id: &str) {
        if !self.grid_connectors.contains_key(id) {
            errors.push(ConfigError::new(field, format!("unknown grid connector \"{id}\"")));
        }
    }

    fn check_charging_station(&self, errors: &mut Vec<ConfigError>, field: String, id: &str) {
        if !self.charging_stations.contains_key(id) {
            errors.push(ConfigError::new(field, format!("unknown charging station \"{id}\"")));
        }
    }

    /// Simulation timing of this scenario.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.start_time, s.interval_minutes.max(1), s.n_intervals, s.seed)
    }

    /// Validates the scenario and builds the initial world and event list.
    ///
    /// # Errors
    ///
    /// Returns every validation error if the scenario is invalid.
    pub fn build(&self) -> Result<Scenario, Vec<ConfigError>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut world = WorldState::default();
        for (id, gc) in &self.grid_connectors {
            world
                .grid_connectors
                .insert(id.clone(), GridConnector::new(gc.max_power_kw));
        }
        for (id, cs) in &self.charging_stations {
            world.charging_stations.insert(
                id.clone(),
                ChargingStation::new(cs.parent.clone(), cs.min_power_kw, cs.max_power_kw),
            );
        }

        let vehicle_types: BTreeMap<&str, VehicleType> = self
            .vehicle_types
            .iter()
            .map(|(id, vt)| {
                let vehicle_type = VehicleType {
                    capacity: vt.capacity_kwh,
                    max_charging_power: vt.max_charging_power_kw,
                    min_charging_power: vt.min_charging_power_kw,
                    efficiency: vt.efficiency,
                };
                (id.as_str(), vehicle_type)
            })
            .collect();
        for (id, v) in &self.vehicles {
            let Some(vehicle_type) = vehicle_types.get(v.vehicle_type.as_str()) else {
                continue;
            };
            let mut vehicle = Vehicle::new(*vehicle_type, v.soc, v.desired_soc);
            if let Some(cs) = &v.connected_charging_station {
                vehicle = vehicle.connect(cs.clone(), v.estimated_time_of_departure);
            }
            world.vehicles.insert(id.clone(), vehicle);
        }

        for (id, b) in &self.batteries {
            world.batteries.insert(
                id.clone(),
                StationaryBattery::new(
                    b.parent.clone(),
                    b.min_charging_power_kw,
                    Battery::new(b.capacity_kwh, b.soc, b.max_power_kw, b.efficiency),
                ),
            );
        }

        Ok(Scenario {
            sim: self.sim_config(),
            strategy: self.strategy.clone(),
            world,
            events: self.events.to_events(),
        })
    }
}

impl EventsConfig {
    /// Flattens the configured inputs into simulation events.
    pub fn to_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for ev in &self.vehicle_events {
            let action = match ev.event_type {
                VehicleEventType::Arrival => VehicleAction::Arrival(ev.update.clone()),
                VehicleEventType::Departure => VehicleAction::Departure,
            };
            let kind = EventKind::Vehicle {
                vehicle_id: ev.vehicle_id.clone(),
                action,
            };
            events.push(signalled(ev.start_time, ev.signal_time, kind));
        }

        for sig in &self.grid_operator_signals {
            let kind = EventKind::GridOperatorSignal {
                grid_connector_id: sig.grid_connector_id.clone(),
                max_power: sig.max_power_kw,
            };
            events.push(signalled(sig.start_time, sig.signal_time, kind));
        }

        for (name, p) in &self.fixed_loads {
            events.extend(p.events(|value| EventKind::FixedLoad {
                grid_connector_id: p.grid_connector_id.clone(),
                name: name.clone(),
                value,
            }));
        }
        for (name, p) in &self.local_generation {
            events.extend(p.events(|value| EventKind::LocalEnergyGeneration {
                grid_connector_id: p.grid_connector_id.clone(),
                name: name.clone(),
                value,
            }));
        }

        events
    }
}

impl ProfileConfig {
    /// One event per value, all signalled at the profile's signal time.
    fn events<'a>(
        &'a self,
        kind: impl Fn(f64) -> EventKind + 'a,
    ) -> impl Iterator<Item = Event> + 'a {
        let step = TimeDelta::minutes(i64::from(self.step_duration_minutes));
        let signal_time = self.signal_time.unwrap_or(self.start_time);
        self.values_kw.iter().enumerate().map(move |(i, &value)| {
            let start_time = self.start_time + step * i as i32;
            Event {
                signal_time: signal_time.min(start_time),
                start_time,
                kind: kind(value),
            }
        })
    }
}

fn signalled(start_time: NaiveDateTime, signal_time: Option<NaiveDateTime>, kind: EventKind) -> Event {
    Event {
        signal_time: signal_time.unwrap_or(start_time),
        start_time,
        kind,
    }
}

fn check_fraction(errors: &mut Vec<ConfigError>, field: String, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::new(field, "must be in [0.0, 1.0]"));
    }
}

fn check_efficiency(errors: &mut Vec<ConfigError>, field: String, value: f64) {
    if !(value > 0.0 && value <= 1.0) {
        errors.push(ConfigError::new(field, "must be in (0.0, 1.0]"));
    }
}

fn check_signal(
    errors: &mut Vec<ConfigError>,
    field: String,
    signal_time: Option<NaiveDateTime>,
    start_time: NaiveDateTime,
) {
    if signal_time.is_some_and(|s| s > start_time) {
        errors.push(ConfigError::new(field, "must not be after start_time"));
    }
}
