//! Entity and application registry with the pause/unpause cascade.

use std::collections::{HashMap, VecDeque};

use slotmap::SlotMap;
use tracing::{debug, info};

use super::application::Application;
use super::entity::{PowerEntity, PowerMeasurement};
use crate::error::PowerError;
use crate::id::{ApplicationId, EntityId};

/// Owns every node, link and placed application of a simulation.
///
/// Entities are addressed by stable [`EntityId`]s so power sources can refer
/// to them without holding references.
#[derive(Debug, Default)]
pub struct Infrastructure {
    entities: SlotMap<EntityId, PowerEntity>,
    names: HashMap<String, EntityId>,
    applications: SlotMap<ApplicationId, Application>,
}

impl Infrastructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity under its unique name.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::DuplicateEntity` if the name is taken.
    pub fn add_entity(&mut self, entity: PowerEntity) -> Result<EntityId, PowerError> {
        if self.names.contains_key(&entity.name) {
            return Err(PowerError::DuplicateEntity(entity.name));
        }
        let name = entity.name.clone();
        let id = self.entities.insert(entity);
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&PowerEntity> {
        self.entities.get(id)
    }

    /// Like [`Infrastructure::entity`] but as a `Result`.
    pub fn get(&self, id: EntityId) -> Result<&PowerEntity, PowerError> {
        self.entities.get(id).ok_or(PowerError::UnknownEntity)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Result<&mut PowerEntity, PowerError> {
        self.entities.get_mut(id).ok_or(PowerError::UnknownEntity)
    }

    /// Looks up an entity id by name.
    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Entity name, or `"<unknown>"` for a stale id.
    pub fn name_of(&self, id: EntityId) -> String {
        self.entities
            .get(id)
            .map_or_else(|| "<unknown>".to_string(), |e| e.name.clone())
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &PowerEntity)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Current power draw of an entity (zero while paused).
    pub fn measure_power(&self, id: EntityId) -> Result<PowerMeasurement, PowerError> {
        Ok(self.get(id)?.measure_power())
    }

    /// Reserves capacity (CU or bandwidth) on one entity.
    pub fn reserve(&mut self, id: EntityId, amount: f64) -> Result<(), PowerError> {
        self.get_mut(id)?.reserve(amount)
    }

    /// Releases previously reserved capacity on one entity.
    pub fn release(&mut self, id: EntityId, amount: f64) -> Result<(), PowerError> {
        self.get_mut(id)?.release(amount);
        Ok(())
    }

    /// Places an application whose tasks are already bound to nodes.
    ///
    /// Reserves each task's CU on its node and each flow's bit rate on every
    /// link of its route. Either every reservation succeeds or none is kept.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::UnknownEntity` for a dangling id and
    /// `PowerError::CapacityExceeded` when an entity runs out of capacity.
    pub fn place(&mut self, app: Application) -> Result<ApplicationId, PowerError> {
        let reservations = Self::reservations(&app);
        let mut done: Vec<(EntityId, f64)> = Vec::with_capacity(reservations.len());

        for &(id, amount) in &reservations {
            if let Err(e) = self.reserve(id, amount) {
                for &(undo_id, undo_amount) in &done {
                    if let Some(entity) = self.entities.get_mut(undo_id) {
                        entity.release(undo_amount);
                    }
                }
                return Err(e);
            }
            done.push((id, amount));
        }

        info!(app = %app.name, tasks = app.tasks.len(), flows = app.flows.len(), "application placed");
        Ok(self.applications.insert(app))
    }

    /// Removes a placed application and releases its reservations.
    pub fn deallocate(&mut self, id: ApplicationId) -> Result<Application, PowerError> {
        let app = self
            .applications
            .remove(id)
            .ok_or(PowerError::UnknownApplication)?;
        for (entity, amount) in Self::reservations(&app) {
            if let Some(e) = self.entities.get_mut(entity) {
                e.release(amount);
            }
        }
        info!(app = %app.name, "application deallocated");
        Ok(app)
    }

    pub fn application(&self, id: ApplicationId) -> Option<&Application> {
        self.applications.get(id)
    }

    /// Looks up a placed application by name.
    pub fn application_id(&self, name: &str) -> Option<ApplicationId> {
        self.applications
            .iter()
            .find_map(|(id, app)| (app.name == name).then_some(id))
    }

    pub fn applications(&self) -> impl Iterator<Item = (ApplicationId, &Application)> {
        self.applications.iter()
    }

    fn reservations(app: &Application) -> Vec<(EntityId, f64)> {
        let mut out: Vec<(EntityId, f64)> = app.tasks.iter().map(|t| (t.node, t.cu)).collect();
        for flow in &app.flows {
            out.extend(flow.links.iter().map(|&l| (l, flow.bit_rate)));
        }
        out
    }

    /// Entities sharing at least one application path with `id`.
    fn path_neighbours(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        for app in self.applications.values() {
            if !app.touches(id) {
                continue;
            }
            for path in app.paths() {
                if path.contains(&id) {
                    out.extend(path.into_iter().filter(|&member| member != id));
                }
            }
        }
        out
    }

    /// Every entity reachable from `id` over application paths, `id` first.
    ///
    /// This is the set a pause or unpause of `id` may touch.
    pub fn path_component(&self, id: EntityId) -> Vec<EntityId> {
        let mut seen = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for member in self.path_neighbours(current) {
                if !seen.contains(&member) {
                    seen.push(member);
                    queue.push_back(member);
                }
            }
        }
        seen
    }

    /// Pauses an active entity and, transitively, every active entity on an
    /// application path through it.
    ///
    /// Returns the ids that changed state, `id` first.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::AlreadyPaused` (without changing anything) if
    /// `id` is already paused.
    pub fn pause(&mut self, id: EntityId) -> Result<Vec<EntityId>, PowerError> {
        let changed = self.cascade(id, true)?;
        info!(
            entity = %self.name_of(id),
            cascaded = changed.len() - 1,
            "entity paused"
        );
        Ok(changed)
    }

    /// Inverse of [`Infrastructure::pause`].
    ///
    /// # Errors
    ///
    /// Returns `PowerError::NotPaused` if `id` is active.
    pub fn unpause(&mut self, id: EntityId) -> Result<Vec<EntityId>, PowerError> {
        let changed = self.cascade(id, false)?;
        info!(
            entity = %self.name_of(id),
            cascaded = changed.len() - 1,
            "entity resumed"
        );
        Ok(changed)
    }

    fn cascade(&mut self, root: EntityId, pausing: bool) -> Result<Vec<EntityId>, PowerError> {
        Self::flip(self.get_mut(root)?, pausing)?;

        let mut changed = vec![root];
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for member in self.path_neighbours(current) {
                let Some(entity) = self.entities.get_mut(member) else {
                    continue;
                };
                if entity.is_paused() != pausing {
                    Self::flip(entity, pausing)?;
                    debug!(entity = %entity.name, pausing, "cascade");
                    changed.push(member);
                    queue.push_back(member);
                }
            }
        }
        Ok(changed)
    }

    fn flip(entity: &mut PowerEntity, pausing: bool) -> Result<(), PowerError> {
        if pausing {
            entity.enter_pause()
        } else {
            entity.leave_pause()
        }
    }
}
