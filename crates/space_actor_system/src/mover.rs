//! Movement along navigation paths.
//!
//! A [`Mover`] belongs to one entity's behavior and is advanced from that
//! entity's tick, so the transform is only ever written by the owning actor.

use crate::entity::Entity;
use crate::navigation::Navigator;
use crate::types::{Capability, Vec3};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Default walking speed in units per second.
pub const DEFAULT_SPEED: f64 = 5.0;

/// Walks one entity along navigator paths.
///
/// # Examples
///
/// ```
/// use space_actor_system::{CapabilitySet, DirectNavigator, Entity, Mover, Vec3};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let entity = Entity::new(CapabilitySet::player(), 10.0);
/// let navigator = Arc::new(DirectNavigator::loaded("maps/demo.nav"));
/// let mut mover = Mover::new(entity.clone(), navigator);
/// mover.set_speed(2.0);
///
/// assert!(mover.move_to(Vec3::new(4.0, 0.0, 0.0)));
/// mover.advance(Duration::from_secs(1));
/// assert_eq!(entity.position(), Vec3::new(2.0, 0.0, 0.0));
/// ```
pub struct Mover {
    entity: Arc<Entity>,
    navigator: Arc<dyn Navigator>,
    speed: f64,
    waypoints: VecDeque<Vec3>,
    paused: bool,
}

impl Mover {
    /// An idle mover walking at [`DEFAULT_SPEED`].
    pub fn new(entity: Arc<Entity>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            entity,
            navigator,
            speed: DEFAULT_SPEED,
            waypoints: VecDeque::new(),
            paused: false,
        }
    }

    /// Sets the speed in units per second. Negative values are clamped to 0.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(0.0);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Starts walking towards `destination`, replacing any current path.
    ///
    /// Returns `false` when the entity is not movable or no path exists.
    pub fn move_to(&mut self, destination: Vec3) -> bool {
        if !self.entity.capabilities().contains(Capability::Movable) {
            return false;
        }
        match self.navigator.find_path(self.entity.position(), destination) {
            Some(path) => {
                self.waypoints = path.into();
                self.paused = false;
                true
            }
            None => {
                trace!("No path for entity {} to {:?}", self.entity.id(), destination);
                false
            }
        }
    }

    /// Drops the current path. The entity stays where it is.
    pub fn stop(&mut self) {
        self.waypoints.clear();
        self.paused = false;
    }

    /// Whether waypoints remain and the mover is not paused.
    pub fn is_moving(&self) -> bool {
        !self.waypoints.is_empty() && !self.paused
    }

    /// Suspends movement while keeping the path.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Remaining waypoints, next one first.
    pub fn waypoints(&self) -> impl Iterator<Item = &Vec3> {
        self.waypoints.iter()
    }

    /// Walks for `dt` along the path and updates the entity's position.
    ///
    /// Returns the new position when the entity moved.
    pub fn advance(&mut self, dt: Duration) -> Option<Vec3> {
        if !self.is_moving() {
            return None;
        }

        let start = self.entity.position();
        let mut position = start;
        let mut budget = self.speed * dt.as_secs_f64();

        while let Some(&next) = self.waypoints.front() {
            let remaining = position.distance(next);
            if remaining <= budget {
                position = next;
                budget -= remaining;
                self.waypoints.pop_front();
            } else {
                position = position.lerp(next, budget / remaining);
                break;
            }
        }

        if position == start {
            return None;
        }
        self.entity.set_position(position);
        self.entity.mark_dirty();
        Some(position)
    }
}

impl std::fmt::Debug for Mover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mover")
            .field("entity", &self.entity.id())
            .field("speed", &self.speed)
            .field("waypoints", &self.waypoints.len())
            .field("paused", &self.paused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::DirectNavigator;
    use crate::types::CapabilitySet;

    fn mover() -> (Arc<Entity>, Mover) {
        let entity = Entity::new(CapabilitySet::player(), 10.0);
        let navigator = Arc::new(DirectNavigator::loaded("test.nav"));
        let mover = Mover::new(entity.clone(), navigator);
        (entity, mover)
    }

    #[test]
    fn test_walks_to_destination() {
        let (entity, mut mover) = mover();
        mover.set_speed(1.0);
        assert!(mover.move_to(Vec3::new(4.0, 0.0, 0.0)));
        assert!(mover.is_moving());

        assert_eq!(mover.advance(Duration::from_secs(1)), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert!(entity.take_dirty());

        assert_eq!(mover.advance(Duration::from_secs(5)), Some(Vec3::new(4.0, 0.0, 0.0)));
        assert!(!mover.is_moving());
        assert_eq!(mover.advance(Duration::from_secs(1)), None);
    }

    #[test]
    fn test_pause_and_stop() {
        let (entity, mut mover) = mover();
        mover.move_to(Vec3::new(10.0, 0.0, 0.0));

        mover.pause();
        assert!(!mover.is_moving());
        assert_eq!(mover.advance(Duration::from_secs(1)), None);
        assert_eq!(entity.position(), Vec3::ZERO);

        mover.resume();
        assert!(mover.advance(Duration::from_secs(1)).is_some());

        mover.stop();
        assert!(!mover.is_moving());
        assert_eq!(mover.waypoints().count(), 0);
    }

    #[test]
    fn test_immovable_entity_refuses() {
        let entity = Entity::new(CapabilitySet::observed(), 0.0);
        let mut mover = Mover::new(entity, Arc::new(DirectNavigator::loaded("test.nav")));
        assert!(!mover.move_to(Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_no_path_without_map() {
        let entity = Entity::new(CapabilitySet::player(), 0.0);
        let mut mover = Mover::new(entity, Arc::new(DirectNavigator::new()));
        assert!(!mover.move_to(Vec3::new(1.0, 0.0, 0.0)));
        assert!(!mover.is_moving());
    }
}
