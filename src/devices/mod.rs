//! Device models: batteries, vehicles, charging stations and the profile
//! generators used to build scenario presets.

/// Site base-load profile generator.
pub mod baseload;
/// Linear battery model and stationary storage.
pub mod battery;
pub mod charging_station;
/// Random fleet plug-in sessions.
pub mod sessions;
/// Solar photovoltaic generation model.
pub mod solar;
pub mod types;
pub mod vehicle;

// Re-export the main types for convenience
pub use baseload::BaseLoad;
pub use battery::{Battery, ChargeOutcome, StationaryBattery};
pub use charging_station::ChargingStation;
pub use sessions::{Session, SessionSampler};
pub use solar::SolarPv;
pub use types::Device;
pub use types::DeviceContext;
pub use vehicle::{Vehicle, VehicleType};
