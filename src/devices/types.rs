//! Common types and traits for profile-generating devices.

use rand::{Rng, rngs::StdRng};

/// Contextual information passed to devices when sampling a profile.
/// # Fields
/// * `timestep` - Simulation timestep being sampled
pub struct DeviceContext {
    pub timestep: usize,
}

impl DeviceContext {
    /// Creates a new DeviceContext for the given timestep.
    pub fn new(timestep: usize) -> Self {
        Self { timestep }
    }
}

/// Trait defining a device that produces or consumes electricity on its own
/// schedule, without taking commands.
///
/// Scenario presets sample these devices once per timestep to turn them into
/// fixed-load and local-generation profiles.
pub trait Device {
    /// Returns the power value at the specified time step.
    ///
    /// Positive values indicate power consumption (load),
    /// negative values indicate power generation.
    ///
    /// # Arguments
    ///
    /// * `context` - Contextual information about the simulation state
    ///
    /// # Returns
    ///
    /// Power in kilowatts (kW) at the specified time step
    fn power_kw(&mut self, context: &DeviceContext) -> f64;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;

    /// Samples `steps` consecutive values starting at timestep 0.
    fn profile(&mut self, steps: usize) -> Vec<f64> {
        (0..steps)
            .map(|t| self.power_kw(&DeviceContext::new(t)))
            .collect()
    }
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight fraction in `[0, 1]` for timestep `t`.
///
/// Zero outside `[sunrise_idx, sunset_idx)`, peaking midway between them.
pub fn daylight_frac(t: usize, steps_per_day: usize, sunrise_idx: usize, sunset_idx: usize) -> f64 {
    let day_t = t % steps_per_day.max(1);
    if day_t < sunrise_idx || day_t >= sunset_idx {
        return 0.0;
    }
    let span = (sunset_idx - sunrise_idx) as f64;
    let pos = (day_t - sunrise_idx) as f64 + 0.5;
    (std::f64::consts::PI * pos / span).sin().max(0.0)
}
