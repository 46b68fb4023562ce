use crate::sources::profile::{MINUTES_PER_DAY, format_time_of_day};

/// Simulated wall clock shared by every task of a simulation.
///
/// Time is kept in whole minutes elapsed since the start; the start itself
/// is a time of day so profiles and events can be expressed as `HH:MM`.
///
/// # Examples
///
/// ```
/// use fog_power_sim::sim::clock::SimClock;
///
/// let mut clock = SimClock::new(23 * 60);
/// clock.advance_to(90);
/// assert_eq!(clock.now(), 90);
/// assert_eq!(clock.time_of_day(), "00:30");
/// assert_eq!(clock.day(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    /// Minutes elapsed since the start.
    now: u64,
    /// Time of day the simulation started at.
    start_min: u64,
}

impl SimClock {
    /// Creates a clock at elapsed time zero.
    ///
    /// # Arguments
    ///
    /// * `start_min` - Start time in minutes after midnight
    pub fn new(start_min: u64) -> Self {
        Self { now: 0, start_min }
    }

    /// Minutes elapsed since the start.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn start_min(&self) -> u64 {
        self.start_min
    }

    /// Minutes since midnight of the first day.
    pub fn absolute(&self) -> u64 {
        self.start_min + self.now
    }

    pub fn day(&self) -> u64 {
        self.absolute() / MINUTES_PER_DAY
    }

    pub fn time_of_day(&self) -> String {
        format_time_of_day(self.absolute())
    }

    /// Moves the clock forward to `elapsed_min`.
    ///
    /// # Panics
    ///
    /// Panics if `elapsed_min` lies in the past.
    pub fn advance_to(&mut self, elapsed_min: u64) {
        assert!(elapsed_min >= self.now, "simulated time cannot move backwards");
        self.now = elapsed_min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock() {
        let clock = SimClock::new(480);
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.absolute(), 480);
        assert_eq!(clock.time_of_day(), "08:00");
    }

    #[test]
    fn test_advance() {
        let mut clock = SimClock::new(0);
        clock.advance_to(5);
        clock.advance_to(5);
        assert_eq!(clock.now(), 5);
        clock.advance_to(1445);
        assert_eq!(clock.day(), 1);
        assert_eq!(clock.time_of_day(), "00:05");
    }

    #[test]
    #[should_panic]
    fn test_backwards_panics() {
        let mut clock = SimClock::new(0);
        clock.advance_to(10);
        clock.advance_to(9);
    }
}
