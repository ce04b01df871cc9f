//! Peak-shaving EV fleet charging simulator.

#[cfg(feature = "api")]
pub mod api;
pub mod cli;
/// Scenario configuration, validation and world construction.
pub mod config;
pub mod devices;
pub mod forecast;
pub mod io;
pub mod presets;
pub mod runner;
/// Simulation engine, world state, events and KPIs.
pub mod sim;
/// Charging strategies.
pub mod strategy;
pub mod telemetry;
