//! Scenario execution: builds the world from a configuration, selects the
//! strategy and runs the engine to completion.

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, Scenario, ScenarioConfig};
use crate::io::export::export_csv;
use crate::sim::engine::Engine;
use crate::sim::kpi::KpiReport;
use crate::sim::types::{SimConfig, StepResult};
use crate::strategy::{Greedy, PeakShaving, PeakShavingOptions, Strategy, StrategyError};

/// Errors that can end a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid scenario:\n{}", join_errors(.0))]
    InvalidScenario(Vec<ConfigError>),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ConfigError::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub sim_config: SimConfig,
    /// Name of the strategy that drove the run.
    pub strategy: &'static str,
    pub results: Vec<StepResult>,
    pub kpi: KpiReport,
}

impl RunOutput {
    /// Writes the step results as CSV telemetry.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if the file cannot be written.
    pub fn export_csv(&self, path: &Path) -> Result<(), SimError> {
        export_csv(&self.results, path)?;
        Ok(())
    }
}

/// Validates `config`, runs it with the configured strategy and computes
/// the KPI report.
///
/// # Errors
///
/// Returns [`SimError::InvalidScenario`] with every validation error, or
/// [`SimError::Strategy`] if a step fails.
pub fn run_scenario(config: &ScenarioConfig) -> Result<RunOutput, SimError> {
    let Scenario {
        sim,
        strategy,
        world,
        events,
    } = config.build().map_err(SimError::InvalidScenario)?;

    info!(
        strategy = %strategy.name,
        steps = sim.total_steps(),
        vehicles = world.vehicles.len(),
        events = events.len(),
        "starting simulation"
    );

    match strategy.name.as_str() {
        "greedy" => {
            let greedy = Greedy::new(sim.dt_hours());
            run_engine(Engine::new(sim, world, events, greedy))
        }
        _ => {
            let options = PeakShavingOptions {
                horizon_hours: strategy.horizon_hours,
                perfect_foresight: strategy.perfect_foresight,
            };
            let peak_shaving = PeakShaving::new(&sim, options, &events);
            run_engine(Engine::new(sim, world, events, peak_shaving))
        }
    }
}

fn run_engine<S: Strategy>(mut engine: Engine<S>) -> Result<RunOutput, SimError> {
    let results = engine.run()?;
    let sim_config = engine.config().clone();
    let kpi = KpiReport::from_results(&results, sim_config.dt_hours());
    info!(
        peak_kw = kpi.peak_load_kw,
        unmet = kpi.unmet_departures,
        "simulation finished"
    );
    Ok(RunOutput {
        sim_config,
        strategy: engine.strategy().description(),
        results,
        kpi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_scenario_reports_every_error() {
        let mut cfg = ScenarioConfig::default();
        cfg.simulation.n_intervals = 0;
        match run_scenario(&cfg) {
            Err(SimError::InvalidScenario(errors)) => {
                assert!(errors.len() >= 2, "{errors:?}");
            }
            other => panic!("expected InvalidScenario, got {other:?}"),
        }
    }

    #[test]
    fn greedy_preset_runs_to_completion() {
        let mut cfg = ScenarioConfig::from_preset("baseline").unwrap();
        cfg.strategy.name = "greedy".into();
        let out = run_scenario(&cfg).unwrap();
        assert_eq!(out.strategy, "Greedy");
        assert_eq!(out.results.len(), cfg.simulation.n_intervals);
    }

    #[test]
    fn error_message_lists_fields() {
        let err = SimError::InvalidScenario(vec![ConfigError {
            field: "vehicles.V1.soc".into(),
            message: "must be in [0.0, 1.0]".into(),
        }]);
        assert!(err.to_string().contains("vehicles.V1.soc"));
    }
}
