//! # Entities
//!
//! An [`Entity`] is the shared, thread-safe face of a live game object. Its
//! mutable logic state lives inside an actor (see [`crate::actor`]); the entity
//! itself only carries what other components need to read: id, transform,
//! owning cell, capabilities and a way to post work to its actor.
//!
//! The transform is written by the entity's own actor only. Cells and the AOI
//! engine read it for distance checks.

use crate::cell::Cell;
use crate::error::CellError;
use crate::message::Delivery;
use crate::types::{CapabilitySet, EntityId, Transform, Vec3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

/// Type-erased handle to an entity's actor.
///
/// Implemented by [`crate::actor::ActorHandle`]; the entity keeps one so that
/// routers can reach any entity without knowing its behavior type.
pub trait ActorRef: Send + Sync {
    /// Enqueues a delivery. Returns `false` if the actor no longer accepts work.
    fn deliver(&self, delivery: Delivery) -> bool;

    /// Starts the grace-period close of the actor.
    fn request_close(&self);

    /// Whether the actor loop has terminated.
    fn is_closed(&self) -> bool;
}

/// Shared state of one simulated object.
///
/// Anyone may read an entity; its transform is written by its own actor only.
/// An entity belongs to at most one cell and is bound to at most one actor.
pub struct Entity {
    id: EntityId,
    capabilities: CapabilitySet,
    aoi_radius: f64,
    transform: RwLock<Transform>,
    cell: RwLock<Weak<Cell>>,
    dirty: AtomicBool,
    actor: OnceLock<Arc<dyn ActorRef>>,
}

impl Entity {
    /// Creates a detached entity with a fresh id.
    pub fn new(capabilities: CapabilitySet, aoi_radius: f64) -> Arc<Self> {
        Self::with_id(EntityId::next(), capabilities, aoi_radius)
    }

    /// Creates a detached entity with a caller-chosen id.
    pub fn with_id(id: EntityId, capabilities: CapabilitySet, aoi_radius: f64) -> Arc<Self> {
        Arc::new(Self {
            id,
            capabilities,
            aoi_radius,
            transform: RwLock::new(Transform::default()),
            cell: RwLock::new(Weak::new()),
            dirty: AtomicBool::new(false),
            actor: OnceLock::new(),
        })
    }

    /// Unique id of this entity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Whether this entity keeps an interest list.
    pub fn is_watcher(&self) -> bool {
        self.capabilities.is_watcher()
    }

    /// Interest radius used when this entity watches others.
    pub fn aoi_radius(&self) -> f64 {
        self.aoi_radius
    }

    // ------------------------------------------------------------------
    // Transform
    // ------------------------------------------------------------------

    pub fn transform(&self) -> Transform {
        *self.transform.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn position(&self) -> Vec3 {
        self.transform().position
    }

    pub fn rotation(&self) -> Vec3 {
        self.transform().rotation
    }

    /// Moves the entity, returning the previous position.
    pub fn set_position(&self, position: Vec3) -> Vec3 {
        let mut transform = self.transform.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut transform.position, position)
    }

    pub fn set_rotation(&self, rotation: Vec3) {
        let mut transform = self.transform.write().unwrap_or_else(PoisonError::into_inner);
        transform.rotation = rotation;
    }

    // ------------------------------------------------------------------
    // Dirty properties
    // ------------------------------------------------------------------

    /// Flags properties as needing a flush on the next tick.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether properties changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    // ------------------------------------------------------------------
    // Cell ownership
    // ------------------------------------------------------------------

    /// The cell this entity currently belongs to.
    pub fn cell(&self) -> Option<Arc<Cell>> {
        self.cell.read().unwrap_or_else(PoisonError::into_inner).upgrade()
    }

    /// Id of the owning cell, or [`EntityId::NONE`] when detached.
    pub fn cell_id(&self) -> EntityId {
        self.cell().map(|cell| cell.entity_id()).unwrap_or(EntityId::NONE)
    }

    /// Points the entity at `cell`; refuses if a different live cell owns it.
    pub(crate) fn attach_cell(&self, cell: &Arc<Cell>) -> Result<(), CellError> {
        let mut current = self.cell.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(owner) = current.upgrade() {
            if !Arc::ptr_eq(&owner, cell) {
                return Err(CellError::AlreadyInCell {
                    entity: self.id,
                    cell: owner.entity_id(),
                });
            }
        }
        *current = Arc::downgrade(cell);
        Ok(())
    }

    pub(crate) fn detach_cell(&self) {
        *self.cell.write().unwrap_or_else(PoisonError::into_inner) = Weak::new();
    }

    // ------------------------------------------------------------------
    // Actor
    // ------------------------------------------------------------------

    /// Binds the entity to its actor. Only the first call succeeds.
    pub fn attach_actor(&self, actor: Arc<dyn ActorRef>) -> bool {
        self.actor.set(actor).is_ok()
    }

    /// The actor bound to this entity, once one has been started.
    pub fn actor(&self) -> Option<&Arc<dyn ActorRef>> {
        self.actor.get()
    }

    pub fn has_actor(&self) -> bool {
        self.actor.get().is_some()
    }

    /// Posts a delivery onto this entity's actor.
    ///
    /// Entities without an actor (or with a closed one) drop the delivery.
    pub fn deliver(&self, delivery: Delivery) -> bool {
        match self.actor.get() {
            Some(actor) => actor.deliver(delivery),
            None => {
                tracing::trace!("Entity {} has no actor, dropping delivery", self.id);
                false
            }
        }
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("aoi_radius", &self.aoi_radius)
            .field("transform", &self.transform())
            .field("cell", &self.cell_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    #[test]
    fn test_transform_updates() {
        let entity = Entity::new(CapabilitySet::player(), 10.0);
        assert_eq!(entity.position(), Vec3::ZERO);

        let old = entity.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(old, Vec3::ZERO);
        assert_eq!(entity.position(), Vec3::new(1.0, 2.0, 3.0));

        entity.set_rotation(Vec3::new(0.0, 90.0, 0.0));
        assert_eq!(entity.rotation().y, 90.0);
    }

    #[test]
    fn test_dirty_flag() {
        let entity = Entity::new(CapabilitySet::observed(), 0.0);
        assert!(!entity.take_dirty());
        entity.mark_dirty();
        assert!(entity.is_dirty());
        assert!(entity.take_dirty());
        assert!(!entity.is_dirty());
    }

    #[test]
    fn test_detached_entity_reports_no_cell() {
        let entity = Entity::new(CapabilitySet::observed().with(Capability::Watcher), 5.0);
        assert!(entity.cell().is_none());
        assert_eq!(entity.cell_id(), EntityId::NONE);
        assert!(entity.is_watcher());
    }

    #[test]
    fn test_delivery_without_actor_is_dropped() {
        let entity = Entity::new(CapabilitySet::observed(), 0.0);
        assert!(!entity.has_actor());
        assert!(!entity.deliver(Delivery::Aoi(Vec::new())));
    }
}
