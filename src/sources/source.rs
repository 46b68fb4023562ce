//! Power sources: shared contract over solar, wind, grid and battery supplies.

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

use super::battery::Battery;
use super::profile::Profile;
use crate::id::EntityId;

/// Inherent lifecycle carbon intensity of solar power (gCO2/kWh).
pub const SOLAR_CARBON_INTENSITY: f64 = 46.0;
/// Inherent lifecycle carbon intensity of wind power (gCO2/kWh).
pub const WIND_CARBON_INTENSITY: f64 = 12.0;

/// Allocation class of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCategory {
    Renewable,
    NonRenewable,
    Battery,
}

/// Where a source sits relative to the entities it powers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLocation {
    Onsite,
    Offsite,
    Local,
}

/// Per-kind data of a power source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Capacity follows an irradiance profile.
    Solar { capacity: Profile },
    /// Capacity follows a wind profile.
    Wind { capacity: Profile },
    /// Unbounded capacity with a (possibly time-varying) mixed intensity.
    Grid { intensity: Profile },
    Battery(Battery),
}

impl SourceKind {
    pub fn category(&self) -> SourceCategory {
        match self {
            SourceKind::Solar { .. } | SourceKind::Wind { .. } => SourceCategory::Renewable,
            SourceKind::Grid { .. } => SourceCategory::NonRenewable,
            SourceKind::Battery(_) => SourceCategory::Battery,
        }
    }

    /// Lower-case kind name used for generated source names.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Solar { .. } => "solar",
            SourceKind::Wind { .. } => "wind",
            SourceKind::Grid { .. } => "grid",
            SourceKind::Battery(_) => "battery",
        }
    }

    fn sampled_profile(&self) -> Option<&Profile> {
        match self {
            SourceKind::Solar { capacity } | SourceKind::Wind { capacity } => Some(capacity),
            SourceKind::Grid { intensity } => Some(intensity),
            SourceKind::Battery(_) => None,
        }
    }
}

/// A power supply inside a power domain.
///
/// The source keeps the ids of the entities it currently powers; the
/// entities keep the id of their source. Both sides are updated together by
/// the owning [`PowerDomain`](crate::sim::domain::PowerDomain).
#[derive(Debug, Clone)]
pub struct PowerSource {
    pub name: String,
    pub kind: SourceKind,
    pub location: SourceLocation,
    priority: usize,
    tick_min: u64,
    cursor_min: u64,
    entities: BTreeSet<EntityId>,
}

impl PowerSource {
    /// Creates a source of any kind at a given location.
    pub fn new(name: impl Into<String>, kind: SourceKind, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            kind,
            location,
            priority: 0,
            tick_min: 1,
            cursor_min: 0,
            entities: BTreeSet::new(),
        }
    }

    /// An onsite solar source.
    pub fn solar(name: impl Into<String>, capacity: Profile) -> Self {
        Self::new(name, SourceKind::Solar { capacity }, SourceLocation::Onsite)
    }

    /// An onsite wind source.
    pub fn wind(name: impl Into<String>, capacity: Profile) -> Self {
        Self::new(name, SourceKind::Wind { capacity }, SourceLocation::Onsite)
    }

    /// An offsite grid connection.
    pub fn grid(name: impl Into<String>, intensity: Profile) -> Self {
        Self::new(name, SourceKind::Grid { intensity }, SourceLocation::Offsite)
    }

    /// A local battery.
    pub fn battery(name: impl Into<String>, battery: Battery) -> Self {
        Self::new(name, SourceKind::Battery(battery), SourceLocation::Local)
    }

    /// Moves the source to another location class.
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn category(&self) -> SourceCategory {
        self.kind.category()
    }

    /// Whether this is the kind of source a domain may hold only one of.
    pub fn is_offsite_nonrenewable(&self) -> bool {
        self.location == SourceLocation::Offsite
            && self.category() == SourceCategory::NonRenewable
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: usize) {
        self.priority = priority;
    }

    pub(crate) fn set_tick_min(&mut self, tick_min: u64) {
        self.tick_min = tick_min.max(1);
    }

    /// Ids of the entities currently powered by this source.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    pub fn powers(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Inserts into the membership set; `false` if already present.
    pub(crate) fn insert_entity(&mut self, entity: EntityId) -> bool {
        self.entities.insert(entity)
    }

    /// Removes from the membership set; `false` if absent.
    pub(crate) fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity)
    }

    pub(crate) fn drain_entities(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.entities).into_iter().collect()
    }

    /// Capacity available at the current sample.
    pub fn current_power(&self) -> f64 {
        match &self.kind {
            SourceKind::Solar { capacity } | SourceKind::Wind { capacity } => {
                capacity.sample(self.cursor_min).max(0.0)
            }
            SourceKind::Grid { .. } => f64::INFINITY,
            SourceKind::Battery(b) => b.remaining_power(),
        }
    }

    /// Carbon intensity (gCO2/kWh) `offset` ticks after the current sample.
    ///
    /// Renewables return their inherent constant and a battery returns zero;
    /// only the grid projects into its intensity profile.
    pub fn current_carbon_intensity(&self, offset: u64) -> f64 {
        match &self.kind {
            SourceKind::Solar { .. } => SOLAR_CARBON_INTENSITY,
            SourceKind::Wind { .. } => WIND_CARBON_INTENSITY,
            SourceKind::Grid { intensity } => {
                intensity.sample(self.cursor_min + offset * self.tick_min)
            }
            SourceKind::Battery(_) => 0.0,
        }
    }

    /// Moves the sample cursor if `elapsed_min` has crossed the next sample
    /// boundary. Returns whether it moved.
    pub fn advance(&mut self, elapsed_min: u64) -> bool {
        let Some(interval) = self.kind.sampled_profile().and_then(Profile::interval_min) else {
            return false;
        };
        if elapsed_min >= self.cursor_min + interval {
            self.cursor_min = elapsed_min - elapsed_min % interval;
            true
        } else {
            false
        }
    }

    pub fn as_battery(&self) -> Option<&Battery> {
        match &self.kind {
            SourceKind::Battery(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_battery_mut(&mut self) -> Option<&mut Battery> {
        match &mut self.kind {
            SourceKind::Battery(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} #{} {:?}] {} entities",
            self.name,
            self.kind.label(),
            self.priority,
            self.location,
            self.entities.len()
        )
    }
}

/// Hands out names for sources created without one: `solar_0`, `grid_1`, ...
///
/// Owned by whatever builds the sources, so two scenarios never share a
/// counter.
#[derive(Debug, Default)]
pub struct SourceNaming {
    next: u32,
}

impl SourceNaming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&mut self, kind: &SourceKind) -> String {
        let name = format!("{}_{}", kind.label(), self.next);
        self.next += 1;
        name
    }
}
