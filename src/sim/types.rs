//! Core simulation types: configuration, strategy commands and step records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

/// Centralized simulation configuration.
///
/// The engine, the strategies and the presets all derive their timing from
/// this struct.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use peakshave_sim::sim::types::SimConfig;
///
/// let start = NaiveDate::from_ymd_opt(2023, 1, 2)
///     .unwrap()
///     .and_hms_opt(0, 0, 0)
///     .unwrap();
/// let cfg = SimConfig::new(start, 15, 96, 42);
/// assert_eq!(cfg.dt_hours(), 0.25);
/// assert_eq!(cfg.steps_per_day(), 96);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimConfig {
    /// Time at which step 0 starts.
    pub start_time: NaiveDateTime,
    /// Duration of one timestep in minutes.
    pub interval_minutes: u32,
    /// Number of timesteps to simulate.
    pub n_intervals: usize,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Arguments
    ///
    /// * `start_time` - Time of the first step
    /// * `interval_minutes` - Step length in minutes (must be > 0)
    /// * `n_intervals` - Number of steps to simulate
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `interval_minutes` is zero.
    pub fn new(
        start_time: NaiveDateTime,
        interval_minutes: u32,
        n_intervals: usize,
        seed: u64,
    ) -> Self {
        assert!(interval_minutes > 0, "interval_minutes must be > 0");
        Self {
            start_time,
            interval_minutes,
            n_intervals,
            seed,
        }
    }

    pub fn interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.interval_minutes))
    }

    /// Duration of one timestep in hours.
    pub fn dt_hours(&self) -> f64 {
        f64::from(self.interval_minutes) / 60.0
    }

    /// Number of whole steps per day (at least 1).
    pub fn steps_per_day(&self) -> usize {
        ((24 * 60) / self.interval_minutes as usize).max(1)
    }

    pub fn total_steps(&self) -> usize {
        self.n_intervals
    }

    /// Start time of `step`.
    pub fn time_at(&self, step: usize) -> NaiveDateTime {
        self.start_time + self.interval() * step as i32
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.time_at(self.n_intervals)
    }
}

/// Charging commands produced by a strategy for one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCommands {
    pub current_time: NaiveDateTime,
    /// Charging-station id to commanded power (kW).
    pub commands: BTreeMap<String, f64>,
}

impl StepCommands {
    pub fn new(current_time: NaiveDateTime) -> Self {
        Self {
            current_time,
            commands: BTreeMap::new(),
        }
    }

    /// Total commanded power (kW).
    pub fn total_kw(&self) -> f64 {
        self.commands.values().sum()
    }
}

/// Record of one grid connector at one simulation timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Timestep index.
    pub timestep: usize,
    /// Start time of the timestep.
    pub time: NaiveDateTime,
    pub grid_connector_id: String,
    /// Ceiling in force during the step (kW).
    pub max_power_kw: f64,
    /// Sum of fixed loads (kW, positive).
    pub fixed_load_kw: f64,
    /// Local generation in connector convention (kW, negative or zero).
    pub generation_kw: f64,
    /// Power delivered to vehicles (kW, positive).
    pub vehicles_kw: f64,
    /// Stationary battery power (kW; positive=charge, negative=discharge).
    pub batteries_kw: f64,
    /// Net connector load (kW).
    pub total_kw: f64,
    /// Number of vehicles drawing power.
    pub vehicles_charging: usize,
    /// Mean SOC of the stationary batteries, if the connector has any.
    pub battery_soc: Option<f64>,
    /// Departures during this step that left below their desired SOC.
    pub unmet_departures: usize,
    /// Whether the net load respected the ceiling.
    pub within_limit: bool,
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>3} ({}) {} | total={:>7.2} kW  max={:>7.2} kW | fixed={:.2}  gen={:.2}  \
             ev={:.2} ({} charging)  bat={:.2}",
            self.timestep,
            self.time.format("%m-%d %H:%M"),
            self.grid_connector_id,
            self.total_kw,
            self.max_power_kw,
            self.fixed_load_kw,
            self.generation_kw,
            self.vehicles_kw,
            self.vehicles_charging,
            self.batteries_kw,
        )?;
        if let Some(soc) = self.battery_soc {
            write!(f, " (SoC={:.1}%)", soc * 100.0)?;
        }
        if self.unmet_departures > 0 {
            write!(f, " unmet={}", self.unmet_departures)?;
        }
        write!(f, " ok={}", self.within_limit)
    }
}
