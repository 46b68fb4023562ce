//! Power domains: a priority-ordered set of sources serving a set of entities.

use std::fmt;

use slotmap::SlotMap;
use tracing::{debug, info};

use super::carbon::{CarbonReport, CarbonSample, EntityCarbon, SourceCarbon};
use super::distributor::{CapacityBudget, DistributionContext, Distributor, PriorityDistributor};
use super::types::SimConfig;
use crate::error::PowerError;
use crate::id::{EntityId, SourceId};
use crate::infra::Infrastructure;
use crate::sources::PowerSource;

/// Links `entity` to `source` on both sides.
pub(crate) fn attach_entity(
    sources: &mut SlotMap<SourceId, PowerSource>,
    infra: &mut Infrastructure,
    source: SourceId,
    entity: EntityId,
) -> Result<(), PowerError> {
    if !sources.contains_key(source) {
        return Err(PowerError::UnknownSource);
    }
    let e = infra.get_mut(entity)?;
    if let Some(current) = e.source() {
        let source_name = sources
            .get(current)
            .map_or_else(|| "<removed>".to_string(), |s| s.name.clone());
        return Err(PowerError::AlreadyAttached {
            entity: e.name.clone(),
            source_name,
        });
    }
    e.set_source(Some(source));
    if let Some(s) = sources.get_mut(source) {
        s.insert_entity(entity);
    }
    Ok(())
}

/// Unlinks `entity` from `source` on both sides.
pub(crate) fn detach_entity(
    sources: &mut SlotMap<SourceId, PowerSource>,
    infra: &mut Infrastructure,
    source: SourceId,
    entity: EntityId,
) -> Result<(), PowerError> {
    let s = sources.get_mut(source).ok_or(PowerError::UnknownSource)?;
    let e = infra.get_mut(entity)?;
    if e.source() != Some(source) || !s.remove_entity(entity) {
        return Err(PowerError::NotAttached {
            entity: e.name.clone(),
            source_name: s.name.clone(),
        });
    }
    e.set_source(None);
    Ok(())
}

/// Sources, entities and the strategy allocating one to the other.
///
/// Slot `i` of the priority list holds the source with priority `i`; a
/// removed source leaves an empty slot so the others keep their priority.
/// Each tick every occupied slot is served in ascending order, emissions are
/// recorded, and the domain fails if any of its entities is left unpowered.
pub struct PowerDomain {
    pub name: String,
    tick_min: u64,
    start_min: u64,
    sources: SlotMap<SourceId, PowerSource>,
    slots: Vec<Option<SourceId>>,
    entities: Vec<EntityId>,
    distributor: Box<dyn Distributor>,
    carbon_emitted: Vec<f64>,
    records: Vec<CarbonSample>,
}

/// Collects the parts of a [`PowerDomain`] before validating them.
pub struct PowerDomainBuilder {
    name: String,
    tick_min: u64,
    start_min: u64,
    sources: Vec<(PowerSource, Option<usize>)>,
    entities: Vec<EntityId>,
    distributor: Box<dyn Distributor>,
}

impl PowerDomainBuilder {
    /// Appends a source after those added so far.
    pub fn source(mut self, source: PowerSource) -> Self {
        self.sources.push((source, None));
        self
    }

    /// Adds a source at an explicit priority slot.
    pub fn source_at(mut self, source: PowerSource, priority: usize) -> Self {
        self.sources.push((source, Some(priority)));
        self
    }

    pub fn entity(mut self, entity: EntityId) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entities(mut self, entities: impl IntoIterator<Item = EntityId>) -> Self {
        self.entities.extend(entities);
        self
    }

    /// Replaces the default non-smart [`PriorityDistributor`].
    pub fn distributor(mut self, distributor: impl Distributor + 'static) -> Self {
        self.distributor = Box::new(distributor);
        self
    }

    pub fn boxed_distributor(mut self, distributor: Box<dyn Distributor>) -> Self {
        self.distributor = distributor;
        self
    }

    /// Validates and assembles the domain.
    ///
    /// # Errors
    ///
    /// `NoSources` / `NoEntities` for empty lists, `UnknownEntity` for an id
    /// missing from `infra`, plus any error of
    /// [`PowerDomain::add_source`] and [`PowerDomain::add_entity`].
    pub fn build(self, infra: &Infrastructure) -> Result<PowerDomain, PowerError> {
        if self.sources.is_empty() {
            return Err(PowerError::NoSources(self.name));
        }
        if self.entities.is_empty() {
            return Err(PowerError::NoEntities(self.name));
        }

        let mut domain = PowerDomain {
            name: self.name,
            tick_min: self.tick_min,
            start_min: self.start_min,
            sources: SlotMap::with_key(),
            slots: Vec::new(),
            entities: Vec::with_capacity(self.entities.len()),
            distributor: self.distributor,
            carbon_emitted: Vec::new(),
            records: Vec::new(),
        };
        for (source, priority) in self.sources {
            domain.add_source(source, priority)?;
        }
        for entity in self.entities {
            domain.add_entity(entity, infra)?;
        }
        info!(
            domain = %domain.name,
            sources = domain.sources.len(),
            entities = domain.entities.len(),
            distributor = domain.distributor.name(),
            "power domain built"
        );
        Ok(domain)
    }
}

impl PowerDomain {
    /// Starts building a domain ticking at the configured update interval.
    pub fn builder(name: impl Into<String>, config: &SimConfig) -> PowerDomainBuilder {
        PowerDomainBuilder {
            name: name.into(),
            tick_min: config.update_interval_min,
            start_min: config.start_min,
            sources: Vec::new(),
            entities: Vec::new(),
            distributor: Box::new(PriorityDistributor::new()),
        }
    }

    pub fn tick_min(&self) -> u64 {
        self.tick_min
    }

    /// Time of day the domain's clock starts at.
    pub fn start_min(&self) -> u64 {
        self.start_min
    }

    pub fn distributor_name(&self) -> &str {
        self.distributor.name()
    }

    /// Adds a source at `priority`, or after the last slot when `None`.
    ///
    /// # Errors
    ///
    /// * `DuplicateSource` if a source with the same name is present
    /// * `MultipleOffsiteNonRenewable` for a second offsite grid-like source
    /// * `SlotOccupied` if the slot already holds a source
    pub fn add_source(
        &mut self,
        mut source: PowerSource,
        priority: Option<usize>,
    ) -> Result<SourceId, PowerError> {
        if self.sources.values().any(|s| s.name == source.name) {
            return Err(PowerError::DuplicateSource(source.name));
        }
        if source.is_offsite_nonrenewable() {
            if let Some(existing) = self.sources.values().find(|s| s.is_offsite_nonrenewable()) {
                return Err(PowerError::MultipleOffsiteNonRenewable {
                    existing: existing.name.clone(),
                });
            }
        }

        let slot = priority.unwrap_or(self.slots.len());
        if let Some(Some(occupant)) = self.slots.get(slot) {
            let occupant = self
                .sources
                .get(*occupant)
                .map_or_else(String::new, |s| s.name.clone());
            return Err(PowerError::SlotOccupied {
                priority: slot,
                occupant,
            });
        }
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }

        source.set_tick_min(self.tick_min);
        source.set_priority(slot);
        info!(domain = %self.name, source = %source.name, priority = slot, "source added");
        let id = self.sources.insert(source);
        self.slots[slot] = Some(id);
        Ok(id)
    }

    /// Removes a source, leaving its slot empty and its entities unpowered.
    pub fn remove_source(
        &mut self,
        id: SourceId,
        infra: &mut Infrastructure,
    ) -> Result<PowerSource, PowerError> {
        let slot = self
            .slots
            .iter()
            .position(|s| *s == Some(id))
            .ok_or(PowerError::UnknownSource)?;
        let mut source = self.sources.remove(id).ok_or(PowerError::UnknownSource)?;
        self.slots[slot] = None;

        let orphans = source.drain_entities();
        for &entity in &orphans {
            if let Ok(e) = infra.get_mut(entity) {
                e.set_source(None);
            }
        }
        info!(
            domain = %self.name,
            source = %source.name,
            priority = slot,
            unpowered = orphans.len(),
            "source removed"
        );
        Ok(source)
    }

    pub fn source(&self, id: SourceId) -> Option<&PowerSource> {
        self.sources.get(id)
    }

    /// Looks up a source by name.
    pub fn source_id(&self, name: &str) -> Option<SourceId> {
        self.sources
            .iter()
            .find_map(|(id, s)| (s.name == name).then_some(id))
    }

    /// The priority list; `None` marks a vacated slot.
    pub fn slots(&self) -> &[Option<SourceId>] {
        &self.slots
    }

    /// Occupied slots in priority order.
    pub fn sources(&self) -> impl Iterator<Item = (SourceId, &PowerSource)> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|&id| self.sources.get(id).map(|s| (id, s)))
    }

    /// Re-synchronises every source's priority with its slot index.
    pub fn assign_priority(&mut self) {
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(source) = slot.and_then(|id| self.sources.get_mut(id)) {
                source.set_priority(i);
            }
        }
    }

    /// Associates an entity with the domain.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if `infra` does not hold it, `DuplicateEntity` if the
    /// domain already does.
    pub fn add_entity(&mut self, entity: EntityId, infra: &Infrastructure) -> Result<(), PowerError> {
        let e = infra.get(entity)?;
        if self.entities.contains(&entity) {
            return Err(PowerError::DuplicateEntity(e.name.clone()));
        }
        self.entities.push(entity);
        Ok(())
    }

    /// Dissociates an entity, detaching it from its source if that source
    /// belongs to this domain.
    pub fn remove_entity(
        &mut self,
        entity: EntityId,
        infra: &mut Infrastructure,
    ) -> Result<(), PowerError> {
        let pos = self
            .entities
            .iter()
            .position(|&e| e == entity)
            .ok_or(PowerError::UnknownEntity)?;
        if let Some(source) = infra.get(entity)?.source() {
            if self.sources.contains_key(source) {
                detach_entity(&mut self.sources, infra, source, entity)?;
            }
        }
        self.entities.remove(pos);
        Ok(())
    }

    /// Entities associated with the domain, in association order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Attaches an unpowered entity to a source.
    ///
    /// # Errors
    ///
    /// `AlreadyAttached` if the entity already has a source.
    pub fn attach(
        &mut self,
        source: SourceId,
        entity: EntityId,
        infra: &mut Infrastructure,
    ) -> Result<(), PowerError> {
        attach_entity(&mut self.sources, infra, source, entity)
    }

    /// Detaches an entity from a source.
    ///
    /// # Errors
    ///
    /// `NotAttached` if the source does not power the entity.
    pub fn detach(
        &mut self,
        source: SourceId,
        entity: EntityId,
        infra: &mut Infrastructure,
    ) -> Result<(), PowerError> {
        detach_entity(&mut self.sources, infra, source, entity)
    }

    /// Fixes an associated entity to a source for static distribution.
    pub fn pin(
        &mut self,
        entity: EntityId,
        source: SourceId,
        infra: &mut Infrastructure,
    ) -> Result<(), PowerError> {
        if !self.entities.contains(&entity) {
            return Err(PowerError::UnknownEntity);
        }
        self.attach(source, entity, infra)?;
        debug!(
            domain = %self.name,
            entity = %infra.name_of(entity),
            source = %self.sources.get(source).map_or("", |s| s.name.as_str()),
            "pinned"
        );
        Ok(())
    }

    /// Recharges a battery source to full from another source.
    ///
    /// Emissions are booked against the battery using the charging source's
    /// intensity projected over the ticks the recharge spans. Returns that
    /// tick count, which callers use to keep the battery's consumers paused.
    ///
    /// # Errors
    ///
    /// `UnknownSource` for a stale id and `NotABattery` if `battery` is not
    /// a battery.
    pub fn recharge_battery(&mut self, battery: SourceId, from: SourceId) -> Result<u64, PowerError> {
        let charger = self.sources.get(from).ok_or(PowerError::UnknownSource)?;
        let target = self.sources.get(battery).ok_or(PowerError::UnknownSource)?;
        let Some(state) = target.as_battery() else {
            return Err(PowerError::NotABattery(target.name.clone()));
        };
        let intensities: Vec<f64> = (0..state.ticks_to_full())
            .map(|k| charger.current_carbon_intensity(k))
            .collect();
        let charger_name = charger.name.clone();

        let state = self
            .sources
            .get_mut(battery)
            .and_then(PowerSource::as_battery_mut)
            .ok_or(PowerError::UnknownSource)?;
        let ticks = state.recharge_with(&charger_name, |k| {
            intensities.get(k as usize).copied().unwrap_or_default()
        });
        info!(domain = %self.name, from = %charger_name, ticks, "battery recharged");
        Ok(ticks)
    }

    /// Carbon booked against this domain's batteries by recharges.
    pub fn recharge_carbon(&self) -> f64 {
        self.sources
            .values()
            .filter_map(PowerSource::as_battery)
            .flat_map(|b| b.recharges())
            .map(|r| r.carbon_released)
            .sum()
    }

    /// Runs one distribution tick at `now_min` minutes after the start.
    ///
    /// Returns the carbon released during the tick.
    ///
    /// # Errors
    ///
    /// Propagates distributor and battery errors and returns
    /// `UnpoweredEntities` if any associated entity ends the tick without a
    /// source. The tick's carbon is on the ledger in either case.
    pub fn tick(&mut self, now_min: u64, infra: &mut Infrastructure) -> Result<f64, PowerError> {
        self.assign_priority();
        let mut sample = CarbonSample::new(self.start_min + now_min);

        let order: Vec<SourceId> = self.slots.iter().flatten().copied().collect();
        for id in order {
            let capacity = self.sources.get(id).map_or(0.0, PowerSource::current_power);
            let mut ctx = DistributionContext::new(
                id,
                CapacityBudget::new(capacity),
                &mut self.sources,
                &mut *infra,
                &self.entities,
            );
            self.distributor.distribute(&mut ctx)?;
            let handed_out = capacity - ctx.remaining();

            let source = self.sources.get_mut(id).ok_or(PowerError::UnknownSource)?;
            source.advance(now_min);
            let intensity = source.current_carbon_intensity(0);
            let mut entry = SourceCarbon::new(source.name.clone());
            for entity in source.entities() {
                let power = infra.measure_power(entity)?.total();
                entry.push(EntityCarbon::new(infra.name_of(entity), power, intensity));
            }
            if let Some(battery) = source.as_battery_mut() {
                battery.consume_power(settled_draw(entry.power_used(), handed_out))?;
            }
            debug!(
                domain = %self.name,
                source = %entry.source,
                entities = entry.entities.len(),
                power = entry.power_used(),
                carbon = entry.total,
                "source served"
            );
            sample.push(entry);
        }

        let total = sample.total();
        self.carbon_emitted.push(total);
        self.records.push(sample);
        self.check_powered(infra)?;
        Ok(total)
    }

    fn check_powered(&self, infra: &Infrastructure) -> Result<(), PowerError> {
        let unpowered: Vec<String> = self
            .entities
            .iter()
            .filter(|&&e| infra.entity(e).is_some_and(|x| x.source().is_none()))
            .map(|&e| infra.name_of(e))
            .collect();
        if unpowered.is_empty() {
            Ok(())
        } else {
            Err(PowerError::UnpoweredEntities {
                domain: self.name.clone(),
                entities: unpowered,
            })
        }
    }

    /// Carbon released per tick, in tick order.
    pub fn carbon_emitted(&self) -> &[f64] {
        &self.carbon_emitted
    }

    /// Sum of every tick's emissions.
    pub fn total_carbon_emissions(&self) -> f64 {
        self.carbon_emitted.iter().sum()
    }

    /// Per-tick, per-source, per-entity records.
    pub fn records(&self) -> &[CarbonSample] {
        &self.records
    }

    /// The records as a JSON array, one object per tick.
    pub fn records_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records)
    }

    pub fn report(&self) -> CarbonReport {
        CarbonReport::from_records(&self.name, &self.records, self.recharge_carbon())
    }
}

/// Relative slack between a battery's measured draw and what its budget
/// handed out, absorbing summation-order rounding.
const DRAW_TOLERANCE: f64 = 1e-9;

/// Draw to take from a battery: the budgeted amount when the measured sum
/// only differs from it by rounding, otherwise the measured sum.
fn settled_draw(measured: f64, budgeted: f64) -> f64 {
    if (measured - budgeted).abs() <= DRAW_TOLERANCE * budgeted.abs().max(1.0) {
        budgeted
    } else {
        measured
    }
}

impl fmt::Debug for PowerDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerDomain")
            .field("name", &self.name)
            .field("tick_min", &self.tick_min)
            .field("slots", &self.slots)
            .field("entities", &self.entities.len())
            .field("distributor", &self.distributor.name())
            .field("ticks", &self.carbon_emitted.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::PowerEntity;
    use crate::sources::Profile;

    fn setup() -> (Infrastructure, EntityId, EntityId) {
        let mut infra = Infrastructure::new();
        let a = infra.add_entity(PowerEntity::node("a", 10.0, 5.0, 5.0)).expect("a should register");
        let b = infra.add_entity(PowerEntity::node("b", 10.0, 7.0, 7.0)).expect("b should register");
        (infra, a, b)
    }

    fn domain(infra: &Infrastructure, entities: &[EntityId]) -> Option<PowerDomain> {
        PowerDomain::builder("edge", &SimConfig::new(1, 10, 0))
            .source(PowerSource::solar("sun", Profile::Constant(100.0)))
            .entities(entities.iter().copied())
            .build(infra)
            .ok()
    }

    #[test]
    fn empty_sources_or_entities_are_rejected() {
        let (infra, a, _) = setup();
        let cfg = SimConfig::new(1, 10, 0);
        let no_sources = PowerDomain::builder("d", &cfg).entity(a).build(&infra);
        assert!(matches!(no_sources, Err(PowerError::NoSources(_))));
        let no_entities = PowerDomain::builder("d", &cfg)
            .source(PowerSource::grid("g", Profile::Constant(1.0)))
            .build(&infra);
        assert!(matches!(no_entities, Err(PowerError::NoEntities(_))));
    }

    #[test]
    fn add_source_rejects_duplicates_and_occupied_slots() {
        let (infra, a, _) = setup();
        let Some(mut d) = domain(&infra, &[a]) else {
            panic!("domain should build");
        };
        let dup = d.add_source(PowerSource::wind("sun", Profile::Constant(1.0)), None);
        assert!(matches!(dup, Err(PowerError::DuplicateSource(_))));
        let occupied = d.add_source(PowerSource::wind("w", Profile::Constant(1.0)), Some(0));
        assert!(matches!(occupied, Err(PowerError::SlotOccupied { priority: 0, .. })));
        assert!(d.add_source(PowerSource::grid("g1", Profile::Constant(1.0)), None).is_ok());
        let second = d.add_source(PowerSource::grid("g2", Profile::Constant(1.0)), None);
        assert!(matches!(
            second,
            Err(PowerError::MultipleOffsiteNonRenewable { .. })
        ));
    }

    #[test]
    fn explicit_priorities_leave_gaps() {
        let (infra, a, _) = setup();
        let Some(mut d) = domain(&infra, &[a]) else {
            panic!("domain should build");
        };
        let w = d.add_source(PowerSource::wind("w", Profile::Constant(1.0)), Some(3)).ok();
        assert_eq!(d.slots().len(), 4);
        assert_eq!(d.slots()[1], None);
        assert_eq!(d.slots()[3], w);
        let next = d.add_source(PowerSource::wind("w2", Profile::Constant(1.0)), None).ok();
        assert_eq!(d.slots()[4], next);
    }

    #[test]
    fn remove_source_leaves_gap_and_unpowers() {
        let (mut infra, a, b) = setup();
        let Some(mut d) = domain(&infra, &[a, b]) else {
            panic!("domain should build");
        };
        let grid = d
            .add_source(PowerSource::grid("g", Profile::Constant(100.0)), None)
            .expect("grid should be added");
        assert!(d.tick(0, &mut infra).is_ok());
        let sun = d.source_id("sun").expect("sun should be in the domain");

        assert!(d.remove_source(sun, &mut infra).is_ok());
        assert_eq!(d.slots(), &[None, Some(grid)]);
        assert!(infra.get(a).map(|e| e.source().is_none()).unwrap_or(false));
        assert!(matches!(d.remove_source(sun, &mut infra), Err(PowerError::UnknownSource)));

        assert!(d.tick(1, &mut infra).is_ok());
        assert_eq!(infra.get(a).ok().and_then(|e| e.source()), Some(grid));
        assert_eq!(d.source(grid).map(PowerSource::priority), Some(1));
    }

    #[test]
    fn attach_and_detach_guard_misuse() {
        let (mut infra, a, _) = setup();
        let Some(mut d) = domain(&infra, &[a]) else {
            panic!("domain should build");
        };
        let sun = d.source_id("sun").expect("sun should be in the domain");
        assert!(matches!(
            d.detach(sun, a, &mut infra),
            Err(PowerError::NotAttached { .. })
        ));
        assert!(d.attach(sun, a, &mut infra).is_ok());
        assert!(matches!(
            d.attach(sun, a, &mut infra),
            Err(PowerError::AlreadyAttached { .. })
        ));
        assert!(d.detach(sun, a, &mut infra).is_ok());
        assert_eq!(d.source(sun).map(PowerSource::entity_count), Some(0));
    }

    #[test]
    fn entity_membership() {
        let (mut infra, a, b) = setup();
        let Some(mut d) = domain(&infra, &[a]) else {
            panic!("domain should build");
        };
        assert!(matches!(d.add_entity(a, &infra), Err(PowerError::DuplicateEntity(_))));
        assert!(d.add_entity(b, &infra).is_ok());
        assert!(d.tick(0, &mut infra).is_ok());
        assert!(d.remove_entity(b, &mut infra).is_ok());
        assert_eq!(d.entities(), &[a]);
        assert!(infra.get(b).map(|e| e.source().is_none()).unwrap_or(false));
        assert!(matches!(d.remove_entity(b, &mut infra), Err(PowerError::UnknownEntity)));
    }

    #[test]
    fn ledger_gets_one_entry_per_tick() {
        let (mut infra, a, b) = setup();
        let Some(mut d) = domain(&infra, &[a, b]) else {
            panic!("domain should build");
        };
        for t in 0..4 {
            assert!(d.tick(t, &mut infra).is_ok());
        }
        assert_eq!(d.carbon_emitted().len(), 4);
        assert_eq!(d.records().len(), 4);
        let per_tick = (5.0 + 7.0) * 1e-3 * 46.0;
        assert!((d.total_carbon_emissions() - 4.0 * per_tick).abs() < 1e-9);
    }

    #[test]
    fn recharge_requires_a_battery() {
        let (infra, a, _) = setup();
        let Some(mut d) = domain(&infra, &[a]) else {
            panic!("domain should build");
        };
        let sun = d.source_id("sun").expect("sun should be in the domain");
        assert!(matches!(
            d.recharge_battery(sun, sun),
            Err(PowerError::NotABattery(_))
        ));
    }

    #[test]
    fn rounding_noise_settles_to_the_budget() {
        assert_eq!(settled_draw(4.6 + 17.1, 21.7), 21.7);
        assert_eq!(settled_draw(0.0, 0.0), 0.0);
        assert_eq!(settled_draw(22.0, 21.7), 22.0);
    }
}
