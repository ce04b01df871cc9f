use std::collections::BTreeMap;

/// A grid connection point that aggregates named load components.
///
/// Load convention:
/// - Positive values increase connector load (consumption)
/// - Negative values reduce connector load (generation, discharge)
///
/// Vehicle loads are keyed by charging-station id, battery loads by battery
/// id, fixed loads and generation by profile name.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConnector {
    /// Static ceiling of the connection (kW).
    pub max_power: f64,
    /// Ceiling currently imposed by the grid operator (kW).
    pub cur_max_power: f64,
    pub current_loads: BTreeMap<String, f64>,
}

impl GridConnector {
    /// Creates a connector with no loads whose current ceiling equals
    /// `max_power`.
    ///
    /// # Panics
    ///
    /// Panics if `max_power` is negative.
    pub fn new(max_power: f64) -> Self {
        assert!(max_power >= 0.0);
        Self {
            max_power,
            cur_max_power: max_power,
            current_loads: BTreeMap::new(),
        }
    }

    /// Adds `power` to the component `key` and returns the recorded power.
    pub fn add_load(&mut self, key: &str, power: f64) -> f64 {
        *self.current_loads.entry(key.to_string()).or_insert(0.0) += power;
        power
    }

    /// Overwrites the component `key`.
    pub fn set_load(&mut self, key: &str, power: f64) {
        self.current_loads.insert(key.to_string(), power);
    }

    /// Sum of all load components (kW).
    pub fn get_current_load(&self) -> f64 {
        self.current_loads.values().sum()
    }

    /// Power that can still be drawn before reaching the current ceiling.
    pub fn headroom(&self) -> f64 {
        (self.cur_max_power - self.get_current_load()).max(0.0)
    }

    /// Returns `true` when the net load does not exceed the current ceiling.
    pub fn within_limits(&self) -> bool {
        self.get_current_load() <= self.cur_max_power + 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connector_defaults() {
        let gc = GridConnector::new(100.0);
        assert_eq!(gc.cur_max_power, 100.0);
        assert_eq!(gc.get_current_load(), 0.0);
        assert!(gc.within_limits());
    }

    #[test]
    fn add_load_accumulates() {
        let mut gc = GridConnector::new(100.0);
        assert_eq!(gc.add_load("CS1", 3.5), 3.5);
        gc.add_load("CS1", 1.5);
        gc.add_load("pv", -2.0);
        assert_eq!(gc.current_loads["CS1"], 5.0);
        assert!((gc.get_current_load() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn set_load_overwrites() {
        let mut gc = GridConnector::new(10.0);
        gc.set_load("building", 4.0);
        gc.set_load("building", 6.0);
        assert_eq!(gc.get_current_load(), 6.0);
        assert_eq!(gc.headroom(), 4.0);
    }

    #[test]
    fn within_limits() {
        let mut gc = GridConnector::new(10.0);
        gc.add_load("building", 9.0);
        assert!(gc.within_limits());

        gc.cur_max_power = 8.0;
        assert!(!gc.within_limits());
        assert_eq!(gc.headroom(), 0.0);
    }
}
