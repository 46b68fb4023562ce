//! Per-tick carbon records and the post-hoc carbon report.

use std::fmt;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::sources::profile::format_time_of_day;

/// Grams of CO2 released by drawing `power` at `intensity` gCO2/kWh.
///
/// # Examples
///
/// ```
/// use fog_power_sim::sim::carbon::carbon_released;
///
/// assert!((carbon_released(50.0, 2.0) - 0.1).abs() < 1e-12);
/// ```
pub fn carbon_released(power: f64, intensity: f64) -> f64 {
    power * 1e-3 * intensity
}

/// One entity's draw on one source during one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityCarbon {
    #[serde(skip)]
    pub entity: String,
    #[serde(rename = "Power Used")]
    pub power_used: f64,
    #[serde(rename = "Carbon Intensity")]
    pub carbon_intensity: f64,
    #[serde(rename = "Carbon Released")]
    pub carbon_released: f64,
}

impl EntityCarbon {
    pub fn new(entity: impl Into<String>, power_used: f64, carbon_intensity: f64) -> Self {
        Self {
            entity: entity.into(),
            power_used,
            carbon_intensity,
            carbon_released: carbon_released(power_used, carbon_intensity),
        }
    }
}

/// Everything one source supplied during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCarbon {
    pub source: String,
    pub entities: Vec<EntityCarbon>,
    pub total: f64,
}

impl SourceCarbon {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entities: Vec::new(),
            total: 0.0,
        }
    }

    pub fn push(&mut self, entry: EntityCarbon) {
        self.total += entry.carbon_released;
        self.entities.push(entry);
    }

    /// Total power drawn from the source this tick.
    pub fn power_used(&self) -> f64 {
        self.entities.iter().map(|e| e.power_used).sum()
    }
}

impl Serialize for SourceCarbon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entities.len() + 1))?;
        for e in &self.entities {
            map.serialize_entry(&e.entity, e)?;
        }
        map.serialize_entry("Total Carbon Released", &self.total)?;
        map.end()
    }
}

/// Carbon released across a whole domain during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CarbonSample {
    /// Absolute simulated time (minutes since midnight of day 0).
    pub time_min: u64,
    pub sources: Vec<SourceCarbon>,
}

impl CarbonSample {
    pub fn new(time_min: u64) -> Self {
        Self {
            time_min,
            sources: Vec::new(),
        }
    }

    pub fn push(&mut self, source: SourceCarbon) {
        self.sources.push(source);
    }

    /// Sum of the per-source totals.
    pub fn total(&self) -> f64 {
        self.sources.iter().map(|s| s.total).sum()
    }

    pub fn source(&self, name: &str) -> Option<&SourceCarbon> {
        self.sources.iter().find(|s| s.source == name)
    }
}

impl Serialize for CarbonSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sources.len()))?;
        for s in &self.sources {
            map.serialize_entry(&s.source, s)?;
        }
        map.end()
    }
}

impl fmt::Display for CarbonSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {} {} | total={:>10.4} gCO2",
            self.time_min / 1440,
            format_time_of_day(self.time_min),
            self.total()
        )?;
        for s in &self.sources {
            write!(
                f,
                " | {}: {} ent, {:.2} W, {:.4} g",
                s.source,
                s.entities.len(),
                s.power_used(),
                s.total
            )?;
        }
        Ok(())
    }
}

/// Aggregate emissions derived from a complete run of one domain.
///
/// Computed post-hoc from the tick records so the report never disagrees
/// with the ledger.
#[derive(Debug, Clone)]
pub struct CarbonReport {
    pub domain: String,
    pub ticks: usize,
    /// Carbon released by entities over the run (gCO2).
    pub total_carbon: f64,
    pub mean_carbon_per_tick: f64,
    pub peak_tick_carbon: f64,
    /// Absolute time of the peak tick, if any tick ran.
    pub peak_tick_time: Option<u64>,
    /// `(source name, carbon)` in first-seen order.
    pub per_source: Vec<(String, f64)>,
    /// Carbon attributed to battery recharges (gCO2).
    pub recharge_carbon: f64,
}

impl CarbonReport {
    /// Builds the report from tick records and recharge emissions.
    pub fn from_records(domain: &str, records: &[CarbonSample], recharge_carbon: f64) -> Self {
        let mut per_source: Vec<(String, f64)> = Vec::new();
        let mut total = 0.0;
        let mut peak = 0.0;
        let mut peak_time = None;

        for r in records {
            let tick_total = r.total();
            total += tick_total;
            if peak_time.is_none() || tick_total > peak {
                peak = tick_total;
                peak_time = Some(r.time_min);
            }
            for s in &r.sources {
                match per_source.iter_mut().find(|(name, _)| *name == s.source) {
                    Some((_, acc)) => *acc += s.total,
                    None => per_source.push((s.source.clone(), s.total)),
                }
            }
        }

        let mean = if records.is_empty() {
            0.0
        } else {
            total / records.len() as f64
        };

        Self {
            domain: domain.to_string(),
            ticks: records.len(),
            total_carbon: total,
            mean_carbon_per_tick: mean,
            peak_tick_carbon: peak,
            peak_tick_time: peak_time,
            per_source,
            recharge_carbon,
        }
    }
}

impl fmt::Display for CarbonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Carbon Report: {} ---", self.domain)?;
        writeln!(f, "Ticks:                 {}", self.ticks)?;
        writeln!(f, "Total released:        {:.4} gCO2", self.total_carbon)?;
        writeln!(f, "Mean per tick:         {:.4} gCO2", self.mean_carbon_per_tick)?;
        match self.peak_tick_time {
            Some(t) => writeln!(
                f,
                "Peak tick:             {:.4} gCO2 at {}",
                self.peak_tick_carbon,
                format_time_of_day(t)
            )?,
            None => writeln!(f, "Peak tick:             n/a")?,
        }
        for (name, carbon) in &self.per_source {
            let share = if self.total_carbon > 0.0 {
                100.0 * carbon / self.total_carbon
            } else {
                0.0
            };
            writeln!(f, "  {name:<20} {carbon:>12.4} gCO2 ({share:.1}%)")?;
        }
        write!(f, "Battery recharges:     {:.4} gCO2", self.recharge_carbon)
    }
}
