//! # Entity Registry
//!
//! Process-wide table of live entities and cells. The registry starts actors,
//! answers destroy requests (a gateway user logging out asks it to destroy its
//! entity) and closes every actor on shutdown.

use crate::actor::{ActorHandle, EntityActor, EntityBehavior};
use crate::cell::{Cell, CellBehavior};
use crate::config::{ActorConfig, CellConfig};
use crate::diagnostics::GatewayErrorChannel;
use crate::entity::Entity;
use crate::error::ActorError;
use crate::types::{CapabilitySet, EntityId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Destroys entities by id.
///
/// Gateway users hold this instead of the whole registry.
pub trait EntityDirectory: Send + Sync {
    /// Returns whether the entity was live.
    fn destroy_entity(&self, id: EntityId) -> bool;
}

/// Point-in-time counters reported by [`EntityRegistry::stats`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Live non-cell entities
    pub entities: usize,
    /// Live cells
    pub cells: usize,
    /// Actor loops that have not finished yet, cells included
    pub actors: usize,
    /// Entities spawned since start
    pub spawned: u64,
    /// Entities destroyed since start
    pub destroyed: u64,
}

/// Owns every live entity, cell and actor loop of a process.
///
/// Each actor loop is watched by a small supervisor task that drops the
/// loop's bookkeeping once it ends, so destroyed entities leave nothing
/// behind after their grace period.
pub struct EntityRegistry {
    entities: DashMap<EntityId, Arc<Entity>>,
    cells: DashMap<EntityId, Arc<Cell>>,
    tasks: Arc<DashMap<EntityId, JoinHandle<()>>>,
    actor_config: ActorConfig,
    cell_config: CellConfig,
    error_channel: Option<Arc<dyn GatewayErrorChannel>>,
    stats: Mutex<RegistryStats>,
}

impl EntityRegistry {
    /// An empty registry. Settings are checked when actors start, see
    /// [`EntityRegistry::spawn`] and [`EntityRegistry::create_cell`].
    pub fn new(actor_config: ActorConfig, cell_config: CellConfig) -> Self {
        Self {
            entities: DashMap::new(),
            cells: DashMap::new(),
            tasks: Arc::new(DashMap::new()),
            actor_config,
            cell_config,
            error_channel: None,
            stats: Mutex::new(RegistryStats::default()),
        }
    }

    /// Channel that receives failure reports from every actor spawned later.
    pub fn with_error_channel(mut self, channel: Arc<dyn GatewayErrorChannel>) -> Self {
        self.error_channel = Some(channel);
        self
    }

    /// Settings every spawned entity actor runs with.
    pub fn actor_config(&self) -> &ActorConfig {
        &self.actor_config
    }

    /// Settings every cell created by this registry runs with.
    pub fn cell_config(&self) -> &CellConfig {
        &self.cell_config
    }

    /// Creates a detached entity using the configured default AOI radius.
    pub fn new_entity(&self, capabilities: CapabilitySet) -> Arc<Entity> {
        Entity::new(capabilities, self.cell_config.default_aoi_radius)
    }

    /// Starts an actor for `behavior` and records its entity.
    ///
    /// # Arguments
    ///
    /// * `behavior` - Logic state of the entity; its entity must not have an
    ///   actor yet
    ///
    /// # Returns
    ///
    /// The handle used to post work to the new actor.
    ///
    /// # Errors
    ///
    /// [`ActorError::AlreadyRunning`] if the entity already has an actor, or
    /// [`ActorError::Config`] if the actor settings are unusable. Nothing is
    /// recorded in either case.
    pub fn spawn<B: EntityBehavior>(&self, behavior: B) -> Result<ActorHandle<B>, ActorError> {
        let entity = behavior.entity().clone();
        let handle = self.start(behavior, self.actor_config.clone())?;
        self.entities.insert(entity.id(), entity.clone());
        self.with_stats(|stats| stats.spawned += 1);
        debug!("🚀 Spawned entity {}", entity.id());
        Ok(handle)
    }

    /// Creates a cell and starts its AOI actor.
    ///
    /// # Errors
    ///
    /// [`ActorError::Config`] if the cell settings fail validation.
    pub fn create_cell(&self) -> Result<Arc<Cell>, ActorError> {
        self.cell_config.validate()?;
        let cell = Cell::new(self.cell_config.clone());
        let config = CellBehavior::actor_config(&cell, &self.actor_config);
        self.start(CellBehavior::new(cell.clone()), config)?;
        self.cells.insert(cell.entity_id(), cell.clone());
        info!("🌍 Created cell {}", cell.entity_id());
        Ok(cell)
    }

    fn start<B: EntityBehavior>(&self, behavior: B, config: ActorConfig) -> Result<ActorHandle<B>, ActorError> {
        let mut actor = EntityActor::new(behavior, config);
        if let Some(channel) = &self.error_channel {
            actor = actor.with_error_channel(channel.clone());
        }
        let handle = actor.handle();
        let id = handle.entity_id();
        let task = actor.run()?;

        let tasks = Arc::clone(&self.tasks);
        let supervisor = tokio::spawn(async move {
            if let Err(e) = task.await {
                warn!("Actor loop for entity {} ended abnormally: {}", id, e);
            }
            tasks.remove(&id);
        });
        self.tasks.insert(id, supervisor);
        // The supervisor may have finished before the insert above.
        self.tasks.remove_if(&id, |_, supervisor| supervisor.is_finished());
        Ok(handle)
    }

    /// Looks up a live entity.
    pub fn get(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.entities.get(&id).map(|entry| entry.value().clone())
    }

    /// Looks up a cell by its own entity id.
    pub fn cell(&self, id: EntityId) -> Option<Arc<Cell>> {
        self.cells.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of live (non-cell) entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of actor loops, cells included, that have not finished yet.
    pub fn actor_count(&self) -> usize {
        self.tasks.len()
    }

    /// Current counters.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone();
        stats.entities = self.entities.len();
        stats.cells = self.cells.len();
        stats.actors = self.tasks.len();
        stats
    }

    fn with_stats(&self, f: impl FnOnce(&mut RegistryStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *stats);
    }

    /// Closes every actor and waits for their loops to finish.
    ///
    /// Returns the number of actor loops awaited. Each actor still honours its
    /// close grace period.
    pub async fn shutdown(&self) -> usize {
        info!(
            "🛑 Shutting down {} entities and {} cells",
            self.entities.len(),
            self.cells.len()
        );

        let entities: Vec<Arc<Entity>> = self.entities.iter().map(|e| e.value().clone()).collect();
        for entity in entities {
            if let Some(cell) = entity.cell() {
                if let Err(e) = cell.remove_entity(entity.id()) {
                    warn!("Entity {} had a stale cell reference: {}", entity.id(), e);
                }
            }
            if let Some(actor) = entity.actor() {
                actor.request_close();
            }
        }
        self.entities.clear();

        for cell in self.cells.iter() {
            if let Some(actor) = cell.entity().actor() {
                actor.request_close();
            }
        }
        self.cells.clear();

        let ids: Vec<EntityId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        let tasks: Vec<JoinHandle<()>> = ids
            .into_iter()
            .filter_map(|id| self.tasks.remove(&id).map(|(_, task)| task))
            .collect();
        let count = tasks.len();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("Actor supervisor ended abnormally: {}", e);
            }
        }
        info!("✅ {} actor loop(s) stopped", count);
        count
    }
}

impl EntityDirectory for EntityRegistry {
    /// Removes the entity, detaches it from its cell (its watchers get a
    /// leave event) and requests its actor close.
    fn destroy_entity(&self, id: EntityId) -> bool {
        let Some((_, entity)) = self.entities.remove(&id) else {
            debug!("Destroy requested for unknown entity {}", id);
            return false;
        };

        if let Some(cell) = entity.cell() {
            if let Err(e) = cell.remove_entity(id) {
                warn!("Entity {} had a stale cell reference: {}", id, e);
            }
        }
        if let Some(actor) = entity.actor() {
            actor.request_close();
        }

        self.with_stats(|stats| stats.destroyed += 1);
        debug!("💀 Destroyed entity {}", id);
        true
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entities.len())
            .field("cells", &self.cells.len())
            .field("actors", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AoiInfo;
    use crate::types::Vec3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    struct Npc {
        entity: Arc<Entity>,
        leaves: Arc<AtomicUsize>,
    }

    impl EntityBehavior for Npc {
        fn entity(&self) -> &Arc<Entity> {
            &self.entity
        }

        fn on_aoi_update(&mut self, batch: Vec<AoiInfo>) {
            let leaves = batch.iter().filter(|info| !info.is_enter).count();
            self.leaves.fetch_add(leaves, Ordering::SeqCst);
        }
    }

    fn registry() -> EntityRegistry {
        EntityRegistry::new(ActorConfig::default(), CellConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_and_destroy() {
        let registry = registry();
        let entity = registry.new_entity(CapabilitySet::player());
        assert_eq!(entity.aoi_radius(), 50.0);

        let handle = registry
            .spawn(Npc {
                entity: entity.clone(),
                leaves: Arc::new(AtomicUsize::new(0)),
            })
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(entity.id()).is_some());

        assert!(registry.destroy_entity(entity.id()));
        assert!(!registry.destroy_entity(entity.id()));
        assert!(registry.get(entity.id()).is_none());
        assert!(handle.is_close_requested());

        sleep(Duration::from_secs(6)).await;
        assert!(handle.is_closed());

        let stats = registry.stats();
        assert_eq!(stats.spawned, 1);
        assert_eq!(stats.destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_notifies_watchers() {
        let registry = registry();
        let cell = registry.create_cell().unwrap();
        assert!(registry.cell(cell.entity_id()).is_some());

        let watcher_leaves = Arc::new(AtomicUsize::new(0));
        let watcher = registry.new_entity(CapabilitySet::player());
        registry
            .spawn(Npc {
                entity: watcher.clone(),
                leaves: watcher_leaves.clone(),
            })
            .unwrap();

        let target = registry.new_entity(CapabilitySet::observed());
        target.set_position(Vec3::new(3.0, 0.0, 0.0));
        registry
            .spawn(Npc {
                entity: target.clone(),
                leaves: Arc::new(AtomicUsize::new(0)),
            })
            .unwrap();

        cell.add_entity(watcher.clone()).unwrap();
        cell.add_entity(target.clone()).unwrap();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(cell.watchers_of(target.id()).len(), 1);

        registry.destroy_entity(target.id());
        sleep(Duration::from_millis(10)).await;
        assert_eq!(watcher_leaves.load(Ordering::SeqCst), 1);
        assert!(!cell.contains(target.id()));
        assert_eq!(target.cell_id(), EntityId::NONE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_every_actor() {
        let registry = registry();
        registry.create_cell().unwrap();
        for _ in 0..3 {
            let entity = registry.new_entity(CapabilitySet::observed());
            registry
                .spawn(Npc {
                    entity,
                    leaves: Arc::new(AtomicUsize::new(0)),
                })
                .unwrap();
        }

        assert_eq!(registry.actor_count(), 4);
        assert_eq!(registry.shutdown().await, 4);
        assert!(registry.is_empty());
        assert_eq!(registry.cell_count(), 0);
        assert_eq!(registry.actor_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_actor_loops_are_released() {
        let registry = registry();
        for _ in 0..200 {
            let entity = registry.new_entity(CapabilitySet::observed());
            let id = entity.id();
            registry
                .spawn(Npc {
                    entity,
                    leaves: Arc::new(AtomicUsize::new(0)),
                })
                .unwrap();
            assert!(registry.destroy_entity(id));
        }
        assert_eq!(registry.actor_count(), 200);

        sleep(Duration::from_secs(10)).await;
        let stats = registry.stats();
        assert_eq!(stats.entities, 0);
        assert_eq!(stats.actors, 0);
        assert_eq!(stats.destroyed, 200);
        assert_eq!(registry.shutdown().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tick_interval_is_rejected() {
        let registry = EntityRegistry::new(
            ActorConfig {
                tick_interval_ms: 0,
                ..ActorConfig::default()
            },
            CellConfig::default(),
        );
        let entity = registry.new_entity(CapabilitySet::player());
        let err = registry
            .spawn(Npc {
                entity: entity.clone(),
                leaves: Arc::new(AtomicUsize::new(0)),
            })
            .unwrap_err();
        assert!(matches!(err, ActorError::Config(_)));
        assert!(registry.is_empty());
        assert_eq!(registry.actor_count(), 0);
        assert!(entity.actor().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_aoi_interval_is_rejected() {
        let registry = EntityRegistry::new(
            ActorConfig::default(),
            CellConfig {
                aoi_tick_interval_ms: 0,
                ..CellConfig::default()
            },
        );
        assert!(matches!(registry.create_cell(), Err(ActorError::Config(_))));
        assert_eq!(registry.cell_count(), 0);
        assert_eq!(registry.actor_count(), 0);
    }
}
