//! # Cells
//!
//! A [`Cell`] is the container that scopes AOI computation: it owns a set of
//! member entities, and interest is only ever computed between members of the
//! same cell. A cell is itself an entity with its own actor
//! ([`CellBehavior`]); every tick of that actor runs one AOI update.
//!
//! Membership changes and the AOI scan take the same lock, so an update always
//! sees a consistent member set. Deliveries produced under the lock are only
//! channel sends and never re-enter the cell.

use crate::actor::EntityBehavior;
use crate::aoi::{AoiEngine, AoiStats, AoiSubject};
use crate::config::{ActorConfig, CellConfig};
use crate::entity::Entity;
use crate::error::CellError;
use crate::message::{AoiInfo, Delivery};
use crate::spatial::SpatialIndex;
use crate::types::{Capability, CapabilitySet, EntityId, Vec3};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct CellState {
    members: HashMap<EntityId, Arc<Entity>>,
    engine: AoiEngine,
}

/// A spatial region that owns its member entities and their interest sets.
///
/// Membership changes and the AOI scan take the same lock, so a scan always
/// sees a consistent member list.
pub struct Cell {
    entity: Arc<Entity>,
    config: CellConfig,
    state: Mutex<CellState>,
}

impl Cell {
    /// Creates an empty cell with a fresh id. The cell's actor is started
    /// separately (see [`crate::EntityRegistry::create_cell`]).
    pub fn new(config: CellConfig) -> Arc<Self> {
        Arc::new(Self {
            entity: Entity::new(CapabilitySet::new(), 0.0),
            config,
            state: Mutex::new(CellState::default()),
        })
    }

    /// The cell's own id.
    pub fn entity_id(&self) -> EntityId {
        self.entity.id()
    }

    /// The entity backing this cell's actor.
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Settings the cell was created with.
    pub fn config(&self) -> &CellConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches `entity` to this cell.
    ///
    /// Adding a current member again is a no-op.
    ///
    /// # Errors
    ///
    /// [`CellError::AlreadyInCell`] if the entity belongs to another cell.
    pub fn add_entity(self: &Arc<Self>, entity: Arc<Entity>) -> Result<(), CellError> {
        let mut state = self.state();
        if state.members.contains_key(&entity.id()) {
            return Ok(());
        }
        entity.attach_cell(self)?;
        debug!("➕ Entity {} joined cell {}", entity.id(), self.entity_id());
        state.members.insert(entity.id(), entity);
        Ok(())
    }

    /// Detaches a member and sends a leave event to everyone watching it.
    ///
    /// # Errors
    ///
    /// [`CellError::NotAMember`] if `id` is not in this cell.
    pub fn remove_entity(&self, id: EntityId) -> Result<Arc<Entity>, CellError> {
        let mut state = self.state();
        let entity = state.members.remove(&id).ok_or(CellError::NotAMember(id))?;
        entity.detach_cell();

        let watchers = state.engine.remove(id);
        for watcher_id in &watchers {
            if let Some(watcher) = state.members.get(watcher_id) {
                watcher.deliver(Delivery::Aoi(vec![AoiInfo::leave(entity.clone())]));
            }
        }

        debug!(
            "➖ Entity {} left cell {} ({} watcher(s) notified)",
            id,
            self.entity_id(),
            watchers.len()
        );
        Ok(entity)
    }

    /// Recomputes interest for every watcher and delivers the changes.
    ///
    /// Each watcher whose set changed receives exactly one batch. Returns the
    /// number of batches delivered.
    pub fn update_aoi(&self) -> usize {
        let mut state = self.state();
        let subjects: Vec<AoiSubject> = state
            .members
            .values()
            .filter(|e| e.capabilities().contains(Capability::Positioned))
            .map(|e| AoiSubject {
                id: e.id(),
                position: e.position(),
                radius: e.aoi_radius(),
                is_watcher: e.is_watcher(),
            })
            .collect();

        let batches = state.engine.update(&subjects);
        let mut delivered = 0;
        for (watcher_id, events) in batches {
            let Some(watcher) = state.members.get(&watcher_id) else {
                continue;
            };
            let batch: Vec<AoiInfo> = events
                .iter()
                .filter_map(|event| {
                    state.members.get(&event.entity_id).map(|subject| AoiInfo {
                        is_enter: event.is_enter,
                        entity: subject.clone(),
                    })
                })
                .collect();
            if batch.is_empty() {
                continue;
            }
            trace!("AOI batch of {} for watcher {}", batch.len(), watcher_id);
            if watcher.deliver(Delivery::Aoi(batch)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Snapshot of the current members, in no particular order.
    pub fn members(&self) -> Vec<Arc<Entity>> {
        self.state().members.values().cloned().collect()
    }

    /// The member with `id`, if it belongs to this cell.
    pub fn member(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.state().members.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().members.is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: EntityId) -> bool {
        self.state().members.contains_key(&id)
    }

    /// Members currently watching `id`, as of the last AOI update.
    pub fn watchers_of(&self, id: EntityId) -> Vec<Arc<Entity>> {
        let state = self.state();
        state
            .engine
            .watchers_of(id)
            .into_iter()
            .filter_map(|watcher| state.members.get(&watcher).cloned())
            .collect()
    }

    /// Positioned members within `radius` of `center`, nearest first.
    ///
    /// # Arguments
    ///
    /// * `center` - Query point
    /// * `radius` - Inclusive distance limit
    ///
    /// # Returns
    ///
    /// Matching members sorted by distance, ties broken by id. Entities
    /// without [`Capability::Positioned`] are never returned.
    pub fn entities_in_range(&self, center: Vec3, radius: f64) -> Vec<Arc<Entity>> {
        let state = self.state();
        let index = SpatialIndex::build(
            state
                .members
                .values()
                .filter(|e| e.capabilities().contains(Capability::Positioned))
                .map(|e| (e.id(), e.position())),
        );

        let mut hits = index.query_radius(center, radius);
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.into_iter()
            .filter_map(|(id, _)| state.members.get(&id).cloned())
            .collect()
    }

    /// Counters of this cell's AOI engine.
    pub fn aoi_stats(&self) -> AoiStats {
        self.state().engine.stats()
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.entity_id())
            .field("members", &self.len())
            .finish()
    }
}

/// Actor behavior of a cell: runs the AOI update on every tick.
pub struct CellBehavior {
    cell: Arc<Cell>,
}

impl CellBehavior {
    /// Behavior driving `cell`. Spawn it with
    /// [`CellBehavior::actor_config`] so it ticks at the AOI rate.
    pub fn new(cell: Arc<Cell>) -> Self {
        Self { cell }
    }

    /// Actor settings for a cell: the base settings ticking at the AOI rate.
    pub fn actor_config(cell: &Cell, base: &ActorConfig) -> ActorConfig {
        ActorConfig {
            tick_interval_ms: cell.config.aoi_tick_interval_ms,
            ..base.clone()
        }
    }
}

impl EntityBehavior for CellBehavior {
    fn entity(&self) -> &Arc<Entity> {
        &self.cell.entity
    }

    fn on_tick(&mut self) {
        self.cell.update_aoi();
    }

    fn on_closed(&mut self) {
        debug!("🧹 Cell {} actor closed with {} member(s)", self.cell.entity_id(), self.cell.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::EntityActor;
    use std::sync::Mutex as StdMutex;
    use tokio::time::{sleep, Duration};

    /// Watcher that records every AOI batch it receives.
    struct Observer {
        entity: Arc<Entity>,
        seen: Arc<StdMutex<Vec<Vec<(bool, EntityId)>>>>,
    }

    impl EntityBehavior for Observer {
        fn entity(&self) -> &Arc<Entity> {
            &self.entity
        }

        fn on_aoi_update(&mut self, batch: Vec<AoiInfo>) {
            self.seen
                .lock()
                .unwrap()
                .push(batch.iter().map(|info| (info.is_enter, info.entity_id())).collect());
        }
    }

    fn spawn_observer(radius: f64, position: Vec3) -> (Arc<Entity>, Arc<StdMutex<Vec<Vec<(bool, EntityId)>>>>) {
        let entity = Entity::new(CapabilitySet::player(), radius);
        entity.set_position(position);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let observer = Observer {
            entity: entity.clone(),
            seen: seen.clone(),
        };
        EntityActor::new(observer, ActorConfig::default()).run().unwrap();
        (entity, seen)
    }

    #[test]
    fn test_membership_is_bidirectional() {
        let cell = Cell::new(CellConfig::default());
        let entity = Entity::new(CapabilitySet::observed(), 0.0);

        cell.add_entity(entity.clone()).unwrap();
        assert!(cell.contains(entity.id()));
        assert_eq!(entity.cell_id(), cell.entity_id());

        // Adding again is a no-op.
        cell.add_entity(entity.clone()).unwrap();
        assert_eq!(cell.len(), 1);

        cell.remove_entity(entity.id()).unwrap();
        assert!(!cell.contains(entity.id()));
        assert_eq!(entity.cell_id(), EntityId::NONE);
        assert_eq!(
            cell.remove_entity(entity.id()).unwrap_err(),
            CellError::NotAMember(entity.id())
        );
    }

    #[test]
    fn test_entity_cannot_join_two_cells() {
        let first = Cell::new(CellConfig::default());
        let second = Cell::new(CellConfig::default());
        let entity = Entity::new(CapabilitySet::observed(), 0.0);

        first.add_entity(entity.clone()).unwrap();
        assert_eq!(
            second.add_entity(entity.clone()).unwrap_err(),
            CellError::AlreadyInCell {
                entity: entity.id(),
                cell: first.entity_id(),
            }
        );
        assert!(!second.contains(entity.id()));

        first.remove_entity(entity.id()).unwrap();
        second.add_entity(entity.clone()).unwrap();
        assert_eq!(entity.cell_id(), second.entity_id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_delivered_once_then_quiet() {
        let cell = Cell::new(CellConfig::default());
        let (a, seen_a) = spawn_observer(10.0, Vec3::ZERO);
        let (b, seen_b) = spawn_observer(10.0, Vec3::new(20.0, 0.0, 0.0));
        cell.add_entity(a.clone()).unwrap();
        cell.add_entity(b.clone()).unwrap();

        assert_eq!(cell.update_aoi(), 0);

        b.set_position(Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(cell.update_aoi(), 2);
        assert_eq!(cell.update_aoi(), 0);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(*seen_a.lock().unwrap(), vec![vec![(true, b.id())]]);
        assert_eq!(*seen_b.lock().unwrap(), vec![vec![(true, a.id())]]);
        assert_eq!(cell.watchers_of(b.id()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_sends_leave_to_watchers_only() {
        let cell = Cell::new(CellConfig::default());
        let (a, seen_a) = spawn_observer(10.0, Vec3::ZERO);
        let (b, seen_b) = spawn_observer(1.0, Vec3::new(5.0, 0.0, 0.0));
        cell.add_entity(a.clone()).unwrap();
        cell.add_entity(b.clone()).unwrap();
        cell.update_aoi();

        cell.remove_entity(b.id()).unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(
            *seen_a.lock().unwrap(),
            vec![vec![(true, b.id())], vec![(false, b.id())]]
        );
        assert!(seen_b.lock().unwrap().is_empty());
        assert!(cell.watchers_of(b.id()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cell_actor_drives_aoi() {
        let cell = Cell::new(CellConfig::default());
        let (a, seen_a) = spawn_observer(10.0, Vec3::ZERO);
        let target = Entity::new(CapabilitySet::observed(), 0.0);
        target.set_position(Vec3::new(0.0, 0.0, 3.0));
        cell.add_entity(a).unwrap();
        cell.add_entity(target.clone()).unwrap();

        let config = CellBehavior::actor_config(&cell, &ActorConfig::default());
        assert_eq!(config.tick_interval_ms, 100);
        EntityActor::new(CellBehavior::new(cell.clone()), config).run().unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen_a.lock().unwrap(), vec![vec![(true, target.id())]]);
        assert_eq!(cell.aoi_stats().updates, 1);
    }

    #[test]
    fn test_entities_in_range_nearest_first() {
        let cell = Cell::new(CellConfig::default());
        let positions = [0.0, 3.0, 8.0, 5.0];
        let entities: Vec<_> = positions
            .iter()
            .map(|x| {
                let e = Entity::new(CapabilitySet::observed(), 0.0);
                e.set_position(Vec3::new(*x, 0.0, 0.0));
                cell.add_entity(e.clone()).unwrap();
                e
            })
            .collect();

        let ids: Vec<EntityId> = cell
            .entities_in_range(Vec3::ZERO, 5.0)
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(ids, vec![entities[0].id(), entities[1].id(), entities[3].id()]);
    }
}
