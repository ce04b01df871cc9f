/// Result of driving a battery for one interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeOutcome {
    /// Average grid-side power over the interval (kW, non-negative).
    pub avg_power: f64,
    /// Signed change in state of charge.
    pub soc_delta: f64,
}

impl ChargeOutcome {
    const IDLE: Self = Self {
        avg_power: 0.0,
        soc_delta: 0.0,
    };
}

/// A linear battery model shared by vehicles and stationary storage.
///
/// The model has a single power limit for both directions, a single
/// efficiency applied on the way in and on the way out, and hard SOC
/// bounds. Energy figures are battery-side unless noted otherwise.
///
/// # Power Flow Convention (Grid Connector)
/// [`Battery::load`] and [`Battery::unload`] both return non-negative average
/// powers; callers record charging as positive and discharging as negative
/// load on the grid connector.
#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    /// Usable capacity in kilowatt-hours.
    pub capacity: f64,

    /// State of charge as a fraction (0.0 to 1.0).
    pub soc: f64,

    /// Maximum charge/discharge power in kilowatts.
    pub max_power: f64,

    /// Conversion efficiency (0..1.0].
    pub efficiency: f64,
}

impl Battery {
    /// Creates a new battery.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Capacity in kWh (must be > 0)
    /// * `soc` - Initial state of charge as a fraction (0.0 to 1.0)
    /// * `max_power` - Power limit in kW (must be >= 0)
    /// * `efficiency` - Conversion efficiency (0..1.0]
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero/negative, SOC out of range, power negative
    /// or efficiency invalid.
    pub fn new(capacity: f64, soc: f64, max_power: f64, efficiency: f64) -> Self {
        assert!(capacity > 0.0);
        assert!((0.0..=1.0).contains(&soc));
        assert!(max_power >= 0.0);
        assert!(efficiency > 0.0 && efficiency <= 1.0);

        Self {
            capacity,
            soc,
            max_power,
            efficiency,
        }
    }

    /// Charges for `dt_hours` at up to `target_power` kW.
    ///
    /// The delivered power is limited by the power limit and by the energy
    /// the battery can still absorb within the interval.
    pub fn load(&mut self, dt_hours: f64, target_power: f64) -> ChargeOutcome {
        if target_power <= 0.0 || dt_hours <= 0.0 {
            return ChargeOutcome::IDLE;
        }

        let cmd_kw = target_power.min(self.max_power);
        let max_kwh_this_step = (1.0 - self.soc) * self.capacity / self.efficiency;
        let max_kw_soc = (max_kwh_this_step / dt_hours).max(0.0);
        let avg_power = cmd_kw.min(max_kw_soc);

        let before = self.soc;
        self.soc += avg_power * dt_hours * self.efficiency / self.capacity;
        self.soc = self.soc.clamp(0.0, 1.0);

        ChargeOutcome {
            avg_power,
            soc_delta: self.soc - before,
        }
    }

    /// Discharges for `dt_hours` at up to `target_power` kW (grid side).
    pub fn unload(&mut self, dt_hours: f64, target_power: f64) -> ChargeOutcome {
        if target_power <= 0.0 || dt_hours <= 0.0 {
            return ChargeOutcome::IDLE;
        }

        let cmd_kw = target_power.min(self.max_power);
        let max_kwh_this_step = self.soc * self.capacity * self.efficiency;
        let max_kw_soc = (max_kwh_this_step / dt_hours).max(0.0);
        let avg_power = cmd_kw.min(max_kw_soc);

        let before = self.soc;
        self.soc -= avg_power * dt_hours / (self.capacity * self.efficiency);
        self.soc = self.soc.clamp(0.0, 1.0);

        ChargeOutcome {
            avg_power,
            soc_delta: self.soc - before,
        }
    }

    /// Battery-side energy (kWh) missing to reach `desired_soc`.
    pub fn energy_needed(&self, desired_soc: f64) -> f64 {
        (self.capacity * (desired_soc - self.soc)).max(0.0)
    }
}

/// Stationary storage attached to a grid connector.
#[derive(Debug, Clone, PartialEq)]
pub struct StationaryBattery {
    /// Parent grid connector id.
    pub parent: String,
    /// Below this magnitude (kW) the battery stays idle.
    pub min_charging_power: f64,
    pub battery: Battery,
}

impl StationaryBattery {
    pub fn new(parent: impl Into<String>, min_charging_power: f64, battery: Battery) -> Self {
        Self {
            parent: parent.into(),
            min_charging_power: min_charging_power.max(0.0),
            battery,
        }
    }
}
