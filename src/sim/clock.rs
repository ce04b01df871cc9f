use chrono::{NaiveDateTime, TimeDelta};

/// A simulation clock that tracks steps over a fixed duration.
///
/// The `Clock` yields each step index together with the wall-clock time at
/// which that step starts.
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, TimeDelta};
/// use peakshave_sim::sim::clock::Clock;
///
/// let start = NaiveDate::from_ymd_opt(2023, 1, 2)
///     .unwrap()
///     .and_hms_opt(0, 0, 0)
///     .unwrap();
/// let mut clock = Clock::new(start, TimeDelta::minutes(15), 3);
/// let mut steps = Vec::new();
///
/// clock.run(|step, _| steps.push(step));
/// assert_eq!(steps, vec![0, 1, 2]);
/// ```
pub struct Clock {
    start: NaiveDateTime,
    interval: TimeDelta,
    /// Current step of the simulation
    current: usize,
    /// Total steps to run in the simulation
    total: usize,
}

impl Clock {
    /// Creates a new clock.
    ///
    /// # Arguments
    ///
    /// * `start` - Time of step 0
    /// * `interval` - Duration of one step
    /// * `total` - The total number of steps the clock will run
    pub fn new(start: NaiveDateTime, interval: TimeDelta, total: usize) -> Self {
        Self {
            start,
            interval,
            current: 0,
            total,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some((step, time))` - The step number before advancing and its start time
    /// * `None` - If the clock has reached its total steps
    pub fn tick(&mut self) -> Option<(usize, NaiveDateTime)> {
        if self.current < self.total {
            let step = self.current;
            self.current += 1;
            Some((step, self.time_at(step)))
        } else {
            None
        }
    }

    /// Start time of `step`.
    pub fn time_at(&self, step: usize) -> NaiveDateTime {
        self.start + self.interval * step as i32
    }

    /// Runs a function for each remaining step in the clock.
    pub fn run(&mut self, mut f: impl FnMut(usize, NaiveDateTime)) {
        while let Some((step, time)) = self.tick() {
            f(step, time);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn tick() {
        let mut clock = Clock::new(start(), TimeDelta::minutes(15), 2);
        assert_eq!(clock.tick(), Some((0, start())));
        assert_eq!(
            clock.tick(),
            Some((1, start() + TimeDelta::minutes(15)))
        );
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn empty_clock() {
        let mut clock = Clock::new(start(), TimeDelta::hours(1), 0);
        assert_eq!(clock.tick(), None);

        let mut was_called = false;
        clock.run(|_, _| was_called = true);
        assert!(!was_called);
    }
}
