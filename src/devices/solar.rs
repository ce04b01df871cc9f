use crate::devices::types::{Device, DeviceContext, daylight_frac, gaussian_noise};
use rand::{SeedableRng, rngs::StdRng};

/// A solar PV generator that models power generation based on daylight hours.
///
/// `SolarPv` creates a half-sine shaped generation profile between sunrise and sunset
/// with configurable peak power output and random noise to simulate
/// variations due to weather conditions.
///
/// # Power Flow Convention (Grid Connector)
/// Returns **negative** values during daylight (generation reduces connector load).
#[derive(Debug, Clone)]
pub struct SolarPv {
    /// Maximum power output in kilowatts under ideal conditions.
    pub kw_peak: f64,

    /// Number of time steps per simulated day.
    steps_per_day: usize,

    /// Time step index (within a day) when sunrise occurs (inclusive).
    pub sunrise_idx: usize,

    /// Time step index (within a day) when sunset occurs (exclusive).
    pub sunset_idx: usize,

    /// Standard deviation of the Gaussian noise as a fraction of output.
    pub noise_std: f64,

    rng: StdRng,
}

impl SolarPv {
    /// Creates a new solar PV generator with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `kw_peak` - Maximum power output in kilowatts under ideal conditions
    /// * `sunrise_idx` - Time step index when sunrise occurs (inclusive)
    /// * `sunset_idx` - Time step index when sunset occurs (exclusive)
    /// * `noise_std` - Standard deviation of noise (e.g., 0.05 for +/-5% variation)
    /// * `steps_per_day` - Number of timesteps per day
    /// * `seed` - Random seed for reproducible noise generation
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_idx >= sunset_idx` or `sunset_idx > steps_per_day`.
    pub fn new(
        kw_peak: f64,
        sunrise_idx: usize,
        sunset_idx: usize,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        assert!(sunrise_idx < sunset_idx && sunset_idx <= steps_per_day);
        Self {
            kw_peak: kw_peak.max(0.0),
            steps_per_day,
            sunrise_idx,
            sunset_idx,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Device for SolarPv {
    /// Returns **negative** values during daylight, 0.0 at night.
    fn power_kw(&mut self, context: &DeviceContext) -> f64 {
        let frac = daylight_frac(
            context.timestep,
            self.steps_per_day,
            self.sunrise_idx,
            self.sunset_idx,
        );
        if frac <= 0.0 {
            return 0.0;
        }

        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        let kw = self.kw_peak * frac * noise_mult;

        -(kw.max(0.0))
    }

    fn device_type(&self) -> &'static str {
        "SolarPV"
    }
}
