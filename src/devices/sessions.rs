use rand::{Rng, SeedableRng, rngs::StdRng};

/// One plug-in session of a fleet vehicle, in absolute simulation steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub arrival_step: usize,
    pub departure_step: usize,
    /// Energy the vehicle wants to recharge during the session (kWh).
    pub demand_kwh: f64,
}

/// Random daily charging sessions for one vehicle.
///
/// Each simulated day, this sampler draws one session with:
/// - random dwell duration (which sets the departure)
/// - random arrival time so that the session ends within the day
/// - random required energy in kWh
///
/// The demand is capped at what `max_charge_kw` can deliver over the dwell.
/// Presets turn the sessions into arrival and departure events.
#[derive(Debug, Clone)]
pub struct SessionSampler {
    /// Maximum charging power in kilowatts.
    pub max_charge_kw: f64,

    /// Number of simulation steps per day.
    steps_per_day: usize,

    /// Duration of one timestep in hours.
    dt_hours: f64,

    /// Minimum daily charging demand in kWh.
    pub demand_kwh_min: f64,

    /// Maximum daily charging demand in kWh.
    pub demand_kwh_max: f64,

    /// Minimum connected duration in simulation steps.
    pub dwell_steps_min: usize,

    /// Maximum connected duration in simulation steps.
    pub dwell_steps_max: usize,

    rng: StdRng,
}

impl SessionSampler {
    /// Creates a new session sampler with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `max_charge_kw` - Maximum charging power in kW (must be > 0)
    /// * `demand_kwh` - Inclusive range of daily charging demand in kWh
    /// * `dwell_steps` - Inclusive range of connected duration in steps (min must be > 0)
    /// * `steps_per_day` - Number of timesteps per day
    /// * `dt_hours` - Duration of one timestep in hours
    /// * `seed` - Random seed for reproducible session generation
    ///
    /// # Panics
    ///
    /// Panics if `max_charge_kw` <= 0, demand ranges invalid, or dwell ranges invalid.
    pub fn new(
        max_charge_kw: f64,
        demand_kwh: (f64, f64),
        dwell_steps: (usize, usize),
        steps_per_day: usize,
        dt_hours: f64,
        seed: u64,
    ) -> Self {
        assert!(max_charge_kw > 0.0);
        assert!(demand_kwh.0 >= 0.0);
        assert!(demand_kwh.1 >= demand_kwh.0);
        assert!(dwell_steps.0 > 0);
        assert!(dwell_steps.1 >= dwell_steps.0);
        assert!(steps_per_day > 0 && dt_hours > 0.0);

        Self {
            max_charge_kw,
            steps_per_day,
            dt_hours,
            demand_kwh_min: demand_kwh.0,
            demand_kwh_max: demand_kwh.1,
            dwell_steps_min: dwell_steps.0,
            dwell_steps_max: dwell_steps.1,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws the session of simulated day `day`.
    pub fn sample_day(&mut self, day: usize) -> Session {
        let dwell_max = self.dwell_steps_max.min(self.steps_per_day);
        let dwell_min = self.dwell_steps_min.min(dwell_max);
        let dwell = self.rng.random_range(dwell_min..=dwell_max);

        let latest_arrival = self.steps_per_day - dwell;
        let arrival = self.rng.random_range(0..=latest_arrival);

        let max_deliverable_kwh = self.max_charge_kw * self.dt_hours * dwell as f64;
        let raw_demand = self
            .rng
            .random_range(self.demand_kwh_min..=self.demand_kwh_max);

        let day_start = day * self.steps_per_day;
        Session {
            arrival_step: day_start + arrival,
            departure_step: day_start + arrival + dwell,
            demand_kwh: raw_demand.min(max_deliverable_kwh).max(0.0),
        }
    }

    /// Draws one session for each of the first `days` days.
    pub fn sample_days(&mut self, days: usize) -> Vec<Session> {
        (0..days).map(|day| self.sample_day(day)).collect()
    }
}
