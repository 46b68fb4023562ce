//! Allocation strategies deciding which source powers which entity.
//!
//! A [`Distributor`] is invoked once per occupied priority slot per tick,
//! lowest index first, and sees the whole entity set of its domain through a
//! [`DistributionContext`].

use std::collections::BTreeSet;

use slotmap::SlotMap;
use tracing::{debug, warn};

use super::domain::{attach_entity, detach_entity};
use crate::error::PowerError;
use crate::id::{EntityId, SourceId};
use crate::infra::Infrastructure;
use crate::sources::PowerSource;

/// Capacity a source has left to hand out during the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityBudget {
    remaining: f64,
}

impl CapacityBudget {
    pub fn new(capacity: f64) -> Self {
        Self {
            remaining: capacity.max(0.0),
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Debits `load` if it fits. Returns whether it did.
    pub fn try_debit(&mut self, load: f64) -> bool {
        if load <= self.remaining {
            self.remaining -= load;
            true
        } else {
            false
        }
    }
}

/// What a distributor may see and change while one source is being served.
pub struct DistributionContext<'a> {
    source: SourceId,
    budget: CapacityBudget,
    sources: &'a mut SlotMap<SourceId, PowerSource>,
    infra: &'a mut Infrastructure,
    entities: &'a [EntityId],
}

impl<'a> DistributionContext<'a> {
    pub(crate) fn new(
        source: SourceId,
        budget: CapacityBudget,
        sources: &'a mut SlotMap<SourceId, PowerSource>,
        infra: &'a mut Infrastructure,
        entities: &'a [EntityId],
    ) -> Self {
        Self {
            source,
            budget,
            sources,
            infra,
            entities,
        }
    }

    /// The source being served.
    pub fn source_id(&self) -> SourceId {
        self.source
    }

    pub fn source(&self) -> Result<&PowerSource, PowerError> {
        self.sources.get(self.source).ok_or(PowerError::UnknownSource)
    }

    /// Priority slot of the source being served.
    pub fn priority(&self) -> usize {
        self.sources.get(self.source).map_or(usize::MAX, PowerSource::priority)
    }

    /// Priority slot of any source in the domain.
    pub fn priority_of(&self, source: SourceId) -> Option<usize> {
        self.sources.get(source).map(PowerSource::priority)
    }

    /// Every entity associated with the domain, in domain order.
    pub fn entities(&self) -> &[EntityId] {
        self.entities
    }

    /// Entities currently attached to the source being served.
    pub fn attached(&self) -> Vec<EntityId> {
        self.sources
            .get(self.source)
            .map(|s| s.entities().collect())
            .unwrap_or_default()
    }

    pub fn infrastructure(&self) -> &Infrastructure {
        &*self.infra
    }

    pub fn budget(&self) -> CapacityBudget {
        self.budget
    }

    pub fn remaining(&self) -> f64 {
        self.budget.remaining()
    }

    pub fn try_debit(&mut self, load: f64) -> bool {
        self.budget.try_debit(load)
    }

    /// Current draw of an entity (zero while paused).
    pub fn load(&self, entity: EntityId) -> Result<f64, PowerError> {
        Ok(self.infra.measure_power(entity)?.total())
    }

    /// Draw an entity will have once resumed: its recorded recovery power,
    /// or its present draw when active.
    pub fn recovery_load(&self, entity: EntityId) -> Result<f64, PowerError> {
        let e = self.infra.get(entity)?;
        Ok(e.recovery_power().unwrap_or_else(|| e.measure_power().total()))
    }

    pub fn is_paused(&self, entity: EntityId) -> Result<bool, PowerError> {
        Ok(self.infra.get(entity)?.is_paused())
    }

    /// Source an entity is attached to, if any.
    pub fn current_source(&self, entity: EntityId) -> Result<Option<SourceId>, PowerError> {
        Ok(self.infra.get(entity)?.source())
    }

    /// Attaches an unpowered entity to the source being served.
    pub fn attach(&mut self, entity: EntityId) -> Result<(), PowerError> {
        attach_entity(self.sources, self.infra, self.source, entity)
    }

    /// Detaches an entity from the source being served.
    pub fn detach(&mut self, entity: EntityId) -> Result<(), PowerError> {
        detach_entity(self.sources, self.infra, self.source, entity)
    }

    /// Moves an entity from whatever source powers it to the one being served.
    pub fn migrate(&mut self, entity: EntityId) -> Result<(), PowerError> {
        if let Some(from) = self.current_source(entity)? {
            detach_entity(self.sources, self.infra, from, entity)?;
        }
        self.attach(entity)
    }

    pub fn pause(&mut self, entity: EntityId) -> Result<Vec<EntityId>, PowerError> {
        self.infra.pause(entity)
    }

    pub fn unpause(&mut self, entity: EntityId) -> Result<Vec<EntityId>, PowerError> {
        self.infra.unpause(entity)
    }

    fn entity_name(&self, entity: EntityId) -> String {
        self.infra.name_of(entity)
    }

    fn source_name(&self) -> String {
        self.sources
            .get(self.source)
            .map_or_else(String::new, |s| s.name.clone())
    }
}

/// Strategy deciding, for one source and one tick, which entities it powers.
pub trait Distributor {
    /// Serves the source in `ctx`.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick and the run.
    fn distribute(&mut self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> Distributor for F
where
    F: FnMut(&mut DistributionContext<'_>) -> Result<(), PowerError>,
{
    fn distribute(&mut self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError> {
        self(ctx)
    }
}

/// Pins a closure's signature so it can be passed where a [`Distributor`]
/// is expected without annotating its argument.
pub fn from_fn<F>(f: F) -> F
where
    F: FnMut(&mut DistributionContext<'_>) -> Result<(), PowerError>,
{
    f
}

/// Greedy allocation in priority order.
///
/// Each source keeps the entities it can still carry, then admits
/// unpowered ones that fit. In smart mode it also pulls entities away from
/// lower-priority sources once everything unpowered has been offered.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityDistributor {
    pub smart: bool,
}

impl PriorityDistributor {
    pub fn new() -> Self {
        Self { smart: false }
    }

    pub fn smart() -> Self {
        Self { smart: true }
    }

    fn retain(&self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError> {
        for entity in ctx.attached() {
            let load = ctx.load(entity)?;
            if !ctx.try_debit(load) {
                ctx.detach(entity)?;
                debug!(
                    entity = %ctx.entity_name(entity),
                    source = %ctx.source_name(),
                    load,
                    "dropped: over capacity"
                );
            }
        }
        Ok(())
    }

    fn admit(&self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError> {
        let entities = ctx.entities().to_vec();
        for entity in entities {
            if ctx.current_source(entity)?.is_some() {
                continue;
            }
            let load = ctx.load(entity)?;
            if ctx.try_debit(load) {
                ctx.attach(entity)?;
                debug!(
                    entity = %ctx.entity_name(entity),
                    source = %ctx.source_name(),
                    load,
                    "admitted"
                );
            }
        }
        Ok(())
    }

    fn upgrade(&self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError> {
        let here = ctx.priority();
        let entities = ctx.entities().to_vec();
        for entity in entities {
            let Some(current) = ctx.current_source(entity)? else {
                continue;
            };
            let lower = ctx.priority_of(current).is_some_and(|p| p > here);
            if !lower {
                continue;
            }
            let load = ctx.load(entity)?;
            if ctx.try_debit(load) {
                ctx.migrate(entity)?;
                debug!(
                    entity = %ctx.entity_name(entity),
                    source = %ctx.source_name(),
                    load,
                    "upgraded"
                );
            }
        }
        Ok(())
    }
}

impl Distributor for PriorityDistributor {
    fn distribute(&mut self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError> {
        self.retain(ctx)?;
        self.admit(ctx)?;
        if self.smart {
            self.upgrade(ctx)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        if self.smart { "smart" } else { "priority" }
    }
}

/// Fixed entity-to-source assignments with pause-on-shortage.
///
/// Entities are pinned to their source with
/// [`PowerDomain::pin`](super::domain::PowerDomain::pin) and never move. An
/// active entity the source cannot carry is paused (with its application
/// paths) and stays attached; it is resumed once the recovery power of its
/// component fits again. Entities paused by anything else are left alone.
#[derive(Debug, Clone, Default)]
pub struct StaticDistributor {
    shed: BTreeSet<EntityId>,
}

impl StaticDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recovery power of the part of `entity`'s path component that this
    /// source carries.
    fn resume_load(ctx: &DistributionContext<'_>, entity: EntityId) -> Result<f64, PowerError> {
        let here = ctx.source_id();
        let mut total = 0.0;
        for member in ctx.infrastructure().path_component(entity) {
            let e = ctx.infrastructure().get(member)?;
            if e.source() == Some(here) && e.is_paused() {
                total += ctx.recovery_load(member)?;
            }
        }
        Ok(total)
    }
}

impl Distributor for StaticDistributor {
    fn distribute(&mut self, ctx: &mut DistributionContext<'_>) -> Result<(), PowerError> {
        let attached = ctx.attached();
        let mut waiting = Vec::new();
        for &entity in &attached {
            if !self.shed.contains(&entity) {
                continue;
            }
            if ctx.is_paused(entity)? {
                waiting.push(entity);
            } else {
                // Resumed from outside.
                self.shed.remove(&entity);
            }
        }

        for &entity in &attached {
            if ctx.is_paused(entity)? {
                continue;
            }
            let load = ctx.load(entity)?;
            if !ctx.try_debit(load) {
                let changed = ctx.pause(entity)?;
                self.shed.insert(entity);
                warn!(
                    entity = %ctx.entity_name(entity),
                    source = %ctx.source_name(),
                    load,
                    available = ctx.remaining(),
                    cascaded = changed.len() - 1,
                    "insufficient power, entity paused"
                );
            }
        }

        for entity in waiting {
            if !ctx.is_paused(entity)? {
                self.shed.remove(&entity);
                continue;
            }
            let need = Self::resume_load(ctx, entity)?;
            if ctx.try_debit(need) {
                ctx.unpause(entity)?;
                self.shed.remove(&entity);
                debug!(
                    entity = %ctx.entity_name(entity),
                    source = %ctx.source_name(),
                    need,
                    "resumed"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_debits_only_when_load_fits() {
        let mut b = CapacityBudget::new(10.0);
        assert!(b.try_debit(4.0));
        assert!(!b.try_debit(7.0));
        assert_eq!(b.remaining(), 6.0);
        assert!(b.try_debit(6.0));
        assert_eq!(b.remaining(), 0.0);
    }

    #[test]
    fn unbounded_budget_never_runs_out() {
        let mut b = CapacityBudget::new(f64::INFINITY);
        assert!(b.try_debit(1e12));
        assert_eq!(b.remaining(), f64::INFINITY);
    }

    #[test]
    fn negative_capacity_is_an_empty_budget() {
        let mut b = CapacityBudget::new(-5.0);
        assert!(b.try_debit(0.0));
        assert!(!b.try_debit(0.1));
    }

    #[test]
    fn names() {
        assert_eq!(PriorityDistributor::new().name(), "priority");
        assert_eq!(PriorityDistributor::smart().name(), "smart");
        assert_eq!(StaticDistributor::new().name(), "static");
        let f = from_fn(|_ctx| Ok(()));
        assert_eq!(f.name(), "custom");
    }
}
