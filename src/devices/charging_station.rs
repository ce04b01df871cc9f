/// A charging point hanging off a grid connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingStation {
    /// Parent grid connector id.
    pub parent: String,
    /// Lowest power (kW) the station can deliver when active.
    pub min_power: f64,
    /// Highest power (kW) the station can deliver.
    pub max_power: f64,
}

impl ChargingStation {
    /// Creates a new charging station.
    ///
    /// # Panics
    ///
    /// Panics if `min_power` is negative or exceeds `max_power`.
    pub fn new(parent: impl Into<String>, min_power: f64, max_power: f64) -> Self {
        assert!(min_power >= 0.0 && min_power <= max_power);
        Self {
            parent: parent.into(),
            min_power,
            max_power,
        }
    }
}
