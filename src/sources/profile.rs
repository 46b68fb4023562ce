//! Time-of-day indexed readings for power capacity and carbon intensity.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::PowerError;

/// Minutes in one simulated day; tables wrap at this period.
pub const MINUTES_PER_DAY: u64 = 1440;

/// Parses an `HH:MM` time of day into minutes after midnight.
///
/// # Errors
///
/// Returns `PowerError::InvalidTimeOfDay` for anything that is not a valid
/// 24-hour clock time.
///
/// # Examples
///
/// ```
/// use fog_power_sim::sources::profile::parse_time_of_day;
///
/// assert_eq!(parse_time_of_day("07:30").ok(), Some(450));
/// assert!(parse_time_of_day("24:00").is_err());
/// ```
pub fn parse_time_of_day(s: &str) -> Result<u64, PowerError> {
    let invalid = || PowerError::InvalidTimeOfDay(s.to_string());
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    if hours >= 24 || minutes >= 60 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Formats minutes after midnight as `HH:MM`, wrapping past midnight.
pub fn format_time_of_day(minutes: u64) -> String {
    let m = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// One day of readings sampled every `interval_min` minutes, rotated so
/// that index 0 is the simulation start time.
///
/// Constructors guarantee `len() * interval_min() == MINUTES_PER_DAY`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    values: Vec<f64>,
    interval_min: u64,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    time: String,
    value: f64,
}

impl ProfileTable {
    /// Builds a table from `(time of day, reading)` rows in table order.
    ///
    /// Rows before `start` are moved to the end, producing one contiguous
    /// sequence that wraps around midnight.
    ///
    /// # Errors
    ///
    /// * `PowerError::InvalidSampleInterval` if `interval_min` is zero
    /// * `PowerError::EmptyProfile` if there are no rows
    /// * `PowerError::InvalidTimeOfDay` for malformed times
    /// * `PowerError::PartialDayProfile` unless the rows span exactly one day
    /// * `PowerError::OffGridSample` if a row is not `interval_min` after the
    ///   previous one
    /// * `PowerError::MissingStartTime` if no row matches `start`
    pub fn from_pairs<I, S>(rows: I, interval_min: u64, start: &str) -> Result<Self, PowerError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        if interval_min == 0 {
            return Err(PowerError::InvalidSampleInterval);
        }
        let start_min = parse_time_of_day(start)?;

        let mut times = Vec::new();
        let mut values = Vec::new();
        for (time, value) in rows {
            times.push(parse_time_of_day(time.as_ref())?);
            values.push(value);
        }
        if values.is_empty() {
            return Err(PowerError::EmptyProfile);
        }
        check_full_day(values.len(), interval_min)?;
        let first = times[0];
        for (i, &t) in times.iter().enumerate() {
            let expected = (first + i as u64 * interval_min) % MINUTES_PER_DAY;
            if t != expected {
                return Err(PowerError::OffGridSample {
                    time: format_time_of_day(t),
                    expected: format_time_of_day(expected),
                });
            }
        }

        let pivot = times
            .iter()
            .position(|&t| t == start_min)
            .ok_or_else(|| PowerError::MissingStartTime {
                start: start.to_string(),
            })?;
        values.rotate_left(pivot);

        Ok(Self {
            values,
            interval_min,
        })
    }

    /// Reads `time,value` CSV rows (with header) from any reader.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        interval_min: u64,
        start: &str,
    ) -> Result<Self, PowerError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for record in rdr.deserialize::<ProfileRow>() {
            let row = record.map_err(|e| PowerError::ProfileCsv(e.to_string()))?;
            rows.push((row.time, row.value));
        }
        Self::from_pairs(rows, interval_min, start)
    }

    /// Reads a CSV profile file.
    pub fn from_csv_path(path: &Path, interval_min: u64, start: &str) -> Result<Self, PowerError> {
        let file = File::open(path)
            .map_err(|e| PowerError::ProfileCsv(format!("{}: {e}", path.display())))?;
        Self::from_csv_reader(file, interval_min, start)
    }

    /// Wraps one day of samples that already begin at the start time.
    pub fn from_samples(values: Vec<f64>, interval_min: u64) -> Result<Self, PowerError> {
        if interval_min == 0 {
            return Err(PowerError::InvalidSampleInterval);
        }
        if values.is_empty() {
            return Err(PowerError::EmptyProfile);
        }
        check_full_day(values.len(), interval_min)?;
        Ok(Self {
            values,
            interval_min,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn interval_min(&self) -> u64 {
        self.interval_min
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Reading in effect `elapsed_min` minutes after the start time.
    pub fn sample(&self, elapsed_min: u64) -> f64 {
        let idx = ((elapsed_min % MINUTES_PER_DAY) / self.interval_min) as usize;
        self.values[idx]
    }
}

fn check_full_day(rows: usize, interval_min: u64) -> Result<(), PowerError> {
    if rows as u64 * interval_min == MINUTES_PER_DAY {
        Ok(())
    } else {
        Err(PowerError::PartialDayProfile { rows, interval_min })
    }
}

/// A reading source: either a fixed value or a sampled table.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Constant(f64),
    Table(ProfileTable),
}

impl Profile {
    pub fn sample(&self, elapsed_min: u64) -> f64 {
        match self {
            Profile::Constant(v) => *v,
            Profile::Table(t) => t.sample(elapsed_min),
        }
    }

    /// Sampling interval, if the profile varies over time.
    pub fn interval_min(&self) -> Option<u64> {
        match self {
            Profile::Constant(_) => None,
            Profile::Table(t) => Some(t.interval_min()),
        }
    }
}
