use rand::{SeedableRng, rngs::StdRng};

use crate::devices::types::{Device, DeviceContext, gaussian_noise};

/// A site base-load generator modelling the depot's own consumption.
///
/// `BaseLoad` creates a sinusoidal daily demand pattern with configurable
/// baseline, amplitude, phase, and random noise. Presets sample it into a
/// fixed-load profile on the grid connector.
///
/// # Examples
///
/// ```
/// use peakshave_sim::devices::{BaseLoad, Device};
///
/// let mut load = BaseLoad::new(20.0, 8.0, 0.0, 0.0, 96, 42);
/// let profile = load.profile(96);
/// assert_eq!(profile.len(), 96);
/// assert!(profile.iter().all(|kw| *kw >= 0.0));
/// ```
#[derive(Debug, Clone)]
pub struct BaseLoad {
    /// Baseline power consumption in kilowatts
    pub base_kw: f64,

    /// Amplitude of the sinusoidal variation in kilowatts
    pub amp_kw: f64,

    /// Phase offset of the sinusoidal pattern in radians
    pub phase_rad: f64,

    /// Standard deviation of the Gaussian noise in kilowatts
    pub noise_std: f64,

    /// Number of time steps per simulated day
    pub steps_per_day: usize,

    rng: StdRng,
}

impl BaseLoad {
    /// Creates a new base-load generator.
    ///
    /// # Arguments
    ///
    /// * `base_kw` - The baseline power consumption in kilowatts
    /// * `amp_kw` - The amplitude of sinusoidal daily variation in kilowatts
    /// * `phase_rad` - The phase offset in radians (0 = rising through baseline at midnight)
    /// * `noise_std` - The standard deviation of Gaussian noise in kilowatts
    /// * `steps_per_day` - The number of time steps per simulated day
    /// * `seed` - Random seed for reproducible noise generation
    pub fn new(
        base_kw: f64,
        amp_kw: f64,
        phase_rad: f64,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std: noise_std.max(0.0),
            steps_per_day: steps_per_day.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Calculates the power demand at a specific time step.
    ///
    /// The demand is guaranteed to be non-negative.
    pub fn demand_kw(&mut self, timestep: usize) -> f64 {
        let day_pos = (timestep % self.steps_per_day) as f64 / self.steps_per_day as f64;
        let angle = 2.0 * std::f64::consts::PI * day_pos + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);

        let kw = self.base_kw + self.amp_kw * angle.sin() + noise;
        kw.max(0.0)
    }
}

impl Device for BaseLoad {
    fn power_kw(&mut self, context: &DeviceContext) -> f64 {
        self.demand_kw(context.timestep)
    }

    fn device_type(&self) -> &'static str {
        "BaseLoad"
    }
}
