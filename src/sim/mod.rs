/// Simulation clock for timestep management.
pub mod clock;
pub mod engine;
/// Timed events and their signalling.
pub mod event;
/// Grid connector model with named load components.
pub mod grid_connector;
pub mod kpi;
pub mod types;
pub mod world;
