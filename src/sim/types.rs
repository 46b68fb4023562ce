//! Core simulation types.

use crate::error::PowerError;
use crate::sources::profile::{MINUTES_PER_DAY, format_time_of_day, parse_time_of_day};

/// Centralized simulation configuration.
///
/// Every power domain and event domain reads its timing from this struct so
/// the tick length and the start offset agree across the whole simulation.
///
/// # Examples
///
/// ```
/// use fog_power_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(5, 60, 42);
/// assert_eq!(cfg.total_ticks(), 12);
/// assert_eq!(cfg.start_min, 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Minutes of simulated time per tick.
    pub update_interval_min: u64,
    /// Time of day (minutes after midnight) the simulation starts at.
    pub start_min: u64,
    /// Simulated minutes to run.
    pub duration_min: u64,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a configuration starting at midnight.
    ///
    /// # Arguments
    ///
    /// * `update_interval_min` - Minutes per tick (must be > 0)
    /// * `duration_min` - Simulated minutes to run
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `update_interval_min` is zero.
    pub fn new(update_interval_min: u64, duration_min: u64, seed: u64) -> Self {
        assert!(update_interval_min > 0, "update_interval_min must be > 0");
        Self {
            update_interval_min,
            start_min: 0,
            duration_min,
            seed,
        }
    }

    /// Sets the start time from an `"HH:MM"` string.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::InvalidTimeOfDay` for malformed input.
    pub fn starting_at(mut self, start: &str) -> Result<Self, PowerError> {
        self.start_min = parse_time_of_day(start)?;
        Ok(self)
    }

    /// Number of ticks that fit in the configured duration.
    pub fn total_ticks(&self) -> u64 {
        self.duration_min / self.update_interval_min
    }

    /// Start time as `"HH:MM"`.
    pub fn start_time(&self) -> String {
        format_time_of_day(self.start_min % MINUTES_PER_DAY)
    }
}
