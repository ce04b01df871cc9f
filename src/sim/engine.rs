//! Simulation engine that drives the world state, the event stream and the
//! charging strategy.

use std::collections::BTreeMap;

use tracing::{debug, error, warn};

use crate::strategy::{Strategy, StrategyError};

use super::clock::Clock;
use super::event::{Event, EventQueue};
use super::types::{SimConfig, StepCommands, StepResult};
use super::world::WorldState;

/// Simulation engine owning the world, the pending events and the strategy.
///
/// Generic over `S: Strategy` for static dispatch.
pub struct Engine<S: Strategy> {
    config: SimConfig,
    world: WorldState,
    queue: EventQueue,
    strategy: S,
}

impl<S: Strategy> Engine<S> {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation configuration
    /// * `world` - Initial world state
    /// * `events` - Every event of the run, in any order
    /// * `strategy` - Charging strategy
    pub fn new(config: SimConfig, world: WorldState, events: Vec<Event>, strategy: S) -> Self {
        Self {
            config,
            world,
            queue: EventQueue::new(events),
            strategy,
        }
    }

    /// Executes one simulation timestep.
    ///
    /// Newly signalled events join the world's future events, events that
    /// have started are applied, vehicle and battery loads are cleared and
    /// the strategy dispatches the step.
    ///
    /// # Arguments
    ///
    /// * `t` - Timestep index
    ///
    /// # Returns
    ///
    /// One `StepResult` per grid connector, in id order.
    ///
    /// # Errors
    ///
    /// Propagates any [`StrategyError`] raised while applying events or by
    /// the strategy.
    pub fn step(&mut self, t: usize) -> Result<Vec<StepResult>, StrategyError> {
        let now = self.config.time_at(t);

        let released = self.queue.release_until(now);
        self.world.add_future_events(released);

        let due = self
            .world
            .future_events
            .iter()
            .take_while(|e| e.start_time <= now)
            .count();
        let started: Vec<Event> = self.world.future_events.drain(..due).collect();

        let mut unmet: BTreeMap<String, usize> = BTreeMap::new();
        for event in &started {
            if let Some(departure) = self.world.apply_event(event)? {
                warn!(
                    vehicle = %departure.vehicle_id,
                    soc = departure.soc,
                    desired_soc = departure.desired_soc,
                    "vehicle left below desired soc"
                );
                *unmet.entry(departure.grid_connector_id).or_default() += 1;
            }
        }

        self.world.reset_device_loads();

        let commands = self.strategy.step(&mut self.world, now)?;
        debug!(
            step = t,
            stations = commands.commands.len(),
            total_kw = commands.total_kw(),
            "strategy commands"
        );

        Ok(self.record(t, &commands, &unmet))
    }

    fn record(
        &self,
        t: usize,
        commands: &StepCommands,
        unmet: &BTreeMap<String, usize>,
    ) -> Vec<StepResult> {
        let world = &self.world;
        world
            .grid_connectors
            .iter()
            .map(|(gc_id, gc)| {
                let mut fixed_load_kw = 0.0;
                let mut generation_kw = 0.0;
                let mut vehicles_kw = 0.0;
                let mut vehicles_charging = 0;
                let mut batteries_kw = 0.0;
                for (key, &kw) in &gc.current_loads {
                    if world.charging_stations.contains_key(key) {
                        vehicles_kw += kw;
                        if kw > 0.0 {
                            vehicles_charging += 1;
                        }
                    } else if world.batteries.contains_key(key) {
                        batteries_kw += kw;
                    } else if kw >= 0.0 {
                        fixed_load_kw += kw;
                    } else {
                        generation_kw += kw;
                    }
                }

                let socs: Vec<f64> = world
                    .batteries
                    .values()
                    .filter(|b| &b.parent == gc_id)
                    .map(|b| b.battery.soc)
                    .collect();
                let battery_soc =
                    (!socs.is_empty()).then(|| socs.iter().sum::<f64>() / socs.len() as f64);

                StepResult {
                    timestep: t,
                    time: commands.current_time,
                    grid_connector_id: gc_id.clone(),
                    max_power_kw: gc.cur_max_power,
                    fixed_load_kw,
                    generation_kw,
                    vehicles_kw,
                    batteries_kw,
                    total_kw: gc.get_current_load(),
                    vehicles_charging,
                    battery_soc,
                    unmet_departures: unmet.get(gc_id).copied().unwrap_or(0),
                    within_limit: gc.within_limits(),
                }
            })
            .collect()
    }

    /// Executes all timesteps and returns the complete step record vector.
    ///
    /// # Errors
    ///
    /// Stops at the first step that fails.
    pub fn run(&mut self) -> Result<Vec<StepResult>, StrategyError> {
        let mut clock = Clock::new(
            self.config.start_time,
            self.config.interval(),
            self.config.total_steps(),
        );
        let mut results =
            Vec::with_capacity(self.config.total_steps() * self.world.grid_connectors.len());
        while let Some((t, now)) = clock.tick() {
            let rows = self.step(t).inspect_err(|e| {
                error!(step = t, time = %now, strategy = self.strategy.description(), "{e}");
            })?;
            results.extend(rows);
        }
        Ok(results)
    }

    /// Returns the current world state.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Returns a reference to the simulation configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}
