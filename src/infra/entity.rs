//! Nodes and links as power-consuming entities.

use std::fmt;

use crate::error::PowerError;
use crate::id::SourceId;

/// Whether an entity computes (node) or transports data (link).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Compute node with capacity measured in CU.
    Node,
    /// Network link with capacity measured in bandwidth units.
    Link,
}

/// Linear power model of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerModel {
    /// `static_w` when idle, rising linearly to `max_w` at full CU usage.
    Node { static_w: f64, max_w: f64 },
    /// `static_w` plus `w_per_unit` for every unit of reserved bandwidth.
    Link { static_w: f64, w_per_unit: f64 },
}

/// One power reading, split into static and load-dependent parts (W).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerMeasurement {
    pub static_w: f64,
    pub dynamic_w: f64,
}

impl PowerMeasurement {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn total(&self) -> f64 {
        self.static_w + self.dynamic_w
    }
}

impl fmt::Display for PowerMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} W (static={:.3}, dynamic={:.3})",
            self.total(),
            self.static_w,
            self.dynamic_w
        )
    }
}

/// Pause state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    Paused,
}

/// A node or link that draws power from at most one source at a time.
///
/// The entity only stores the id of its current source; the source itself
/// lives in a power domain and keeps the reverse membership set.
#[derive(Debug, Clone)]
pub struct PowerEntity {
    /// Unique entity name, used as the key in carbon records.
    pub name: String,
    /// Node or link.
    pub kind: EntityKind,
    /// Maximum reservable load (CU for nodes, bandwidth for links).
    pub capacity: f64,
    used: f64,
    model: PowerModel,
    state: PowerState,
    recovery_power: Option<f64>,
    source: Option<SourceId>,
}

impl PowerEntity {
    /// Creates a compute node.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique entity name
    /// * `cu` - Compute capacity in CU
    /// * `static_w` - Idle power draw (W)
    /// * `max_w` - Power draw at full utilisation (W)
    pub fn node(name: impl Into<String>, cu: f64, static_w: f64, max_w: f64) -> Self {
        Self::new(
            name.into(),
            EntityKind::Node,
            cu.max(0.0),
            PowerModel::Node {
                static_w: static_w.max(0.0),
                max_w: max_w.max(static_w).max(0.0),
            },
        )
    }

    /// Creates a network link.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique entity name
    /// * `bandwidth` - Reservable bandwidth
    /// * `static_w` - Idle power draw (W)
    /// * `w_per_unit` - Additional draw per unit of reserved bandwidth (W)
    pub fn link(name: impl Into<String>, bandwidth: f64, static_w: f64, w_per_unit: f64) -> Self {
        Self::new(
            name.into(),
            EntityKind::Link,
            bandwidth.max(0.0),
            PowerModel::Link {
                static_w: static_w.max(0.0),
                w_per_unit: w_per_unit.max(0.0),
            },
        )
    }

    fn new(name: String, kind: EntityKind, capacity: f64, model: PowerModel) -> Self {
        Self {
            name,
            kind,
            capacity,
            used: 0.0,
            model,
            state: PowerState::Active,
            recovery_power: None,
            source: None,
        }
    }

    /// Currently reserved load.
    pub fn used(&self) -> f64 {
        self.used
    }

    /// Load still available for reservation.
    pub fn free(&self) -> f64 {
        (self.capacity - self.used).max(0.0)
    }

    /// Reserves `amount` of capacity.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::CapacityExceeded` if the entity does not have
    /// `amount` free. The reservation is left unchanged in that case.
    pub fn reserve(&mut self, amount: f64) -> Result<(), PowerError> {
        if amount > self.free() + f64::EPSILON {
            return Err(PowerError::CapacityExceeded {
                entity: self.name.clone(),
                requested: amount,
                available: self.free(),
            });
        }
        self.used = (self.used + amount).min(self.capacity);
        Ok(())
    }

    /// Releases `amount` of reserved capacity, saturating at zero.
    pub fn release(&mut self, amount: f64) {
        self.used = (self.used - amount).max(0.0);
    }

    /// Reading the entity would produce if it were active, regardless of state.
    pub fn active_measurement(&self) -> PowerMeasurement {
        match self.model {
            PowerModel::Node { static_w, max_w } => {
                let utilisation = if self.capacity > 0.0 {
                    self.used / self.capacity
                } else {
                    0.0
                };
                PowerMeasurement {
                    static_w,
                    dynamic_w: (max_w - static_w) * utilisation,
                }
            }
            PowerModel::Link {
                static_w,
                w_per_unit,
            } => PowerMeasurement {
                static_w,
                dynamic_w: w_per_unit * self.used,
            },
        }
    }

    /// Current power draw; zero while paused.
    pub fn measure_power(&self) -> PowerMeasurement {
        match self.state {
            PowerState::Active => self.active_measurement(),
            PowerState::Paused => PowerMeasurement::zero(),
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == PowerState::Paused
    }

    /// Power this entity needs to resume, recorded when it was paused.
    pub fn recovery_power(&self) -> Option<f64> {
        self.recovery_power
    }

    /// Id of the source currently powering this entity.
    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub(crate) fn set_source(&mut self, source: Option<SourceId>) {
        self.source = source;
    }

    /// Transitions `Active -> Paused` for this entity only.
    pub(crate) fn enter_pause(&mut self) -> Result<(), PowerError> {
        if self.is_paused() {
            return Err(PowerError::AlreadyPaused(self.name.clone()));
        }
        self.recovery_power = Some(self.active_measurement().total());
        self.state = PowerState::Paused;
        Ok(())
    }

    /// Transitions `Paused -> Active` for this entity only.
    pub(crate) fn leave_pause(&mut self) -> Result<(), PowerError> {
        if !self.is_paused() {
            return Err(PowerError::NotPaused(self.name.clone()));
        }
        self.recovery_power = None;
        self.state = PowerState::Active;
        Ok(())
    }
}
