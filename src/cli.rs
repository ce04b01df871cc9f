//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ScenarioConfig};

#[derive(Debug, Parser)]
#[command(name = "peakshave-sim", version)]
#[command(about = "Peak-shaving EV fleet charging simulator")]
#[command(
    long_about = "Simulates a depot of electric vehicles behind grid connectors and \
    charges them with a peak-shaving or greedy strategy.\n\
    \nIf neither --scenario nor --preset is given, the baseline preset is used.\n\
    \nExamples:\n  \
    peakshave-sim --preset solar_depot\n  \
    peakshave-sim --scenario depot.toml --strategy greedy --telemetry-out run.csv"
)]
pub struct Args {
    /// Load the scenario from a TOML file
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, solar_depot, tight_grid)
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Override the charging strategy (peak_shaving, greedy)
    #[arg(long, value_parser = ["peak_shaving", "greedy"])]
    pub strategy: Option<String>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the peak-shaving lookahead in hours
    #[arg(long, value_name = "HOURS")]
    pub horizon_hours: Option<u32>,

    /// Export step results to CSV
    #[arg(long, value_name = "PATH")]
    pub telemetry_out: Option<PathBuf>,

    /// Only print the KPI report
    #[arg(long, short)]
    pub quiet: bool,

    /// Start the REST API server after the simulation
    #[cfg(feature = "api")]
    #[arg(long)]
    pub serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
}

impl Args {
    /// Loads the selected scenario and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be parsed or the preset is
    /// unknown.
    pub fn load_scenario(&self) -> Result<ScenarioConfig, ConfigError> {
        let seed = self.seed;
        let mut scenario = match (&self.scenario, &self.preset) {
            (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
            (None, Some(name)) => match seed {
                Some(seed) => ScenarioConfig::from_preset_seeded(name, seed)?,
                None => ScenarioConfig::from_preset(name)?,
            },
            (None, None) => match seed {
                Some(seed) => ScenarioConfig::from_preset_seeded("baseline", seed)?,
                None => ScenarioConfig::from_preset("baseline")?,
            },
        };
        self.apply_overrides(&mut scenario);
        Ok(scenario)
    }

    fn apply_overrides(&self, scenario: &mut ScenarioConfig) {
        if let Some(seed) = self.seed {
            scenario.simulation.seed = seed;
        }
        if let Some(name) = &self.strategy {
            scenario.strategy.name.clone_from(name);
        }
        if let Some(hours) = self.horizon_hours {
            scenario.strategy.horizon_hours = hours;
        }
    }
}
