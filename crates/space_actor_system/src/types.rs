//! # Core Type Definitions
//!
//! Fundamental value types shared by the actor runtime, the cell hierarchy and
//! the AOI engine.
//!
//! ## Key Types
//!
//! - [`EntityId`] - 64-bit identifier for entities and cells
//! - [`Vec3`] - 3D vector used for positions and rotations
//! - [`Transform`] - position + rotation pair owned by an entity
//! - [`Capability`] / [`CapabilitySet`] - what an entity can do

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an entity (players, NPCs and cells alike).
///
/// Ids are allocated from a process-wide counter starting at 1. The value 0 is
/// reserved and used as the "no cell" surrogate by [`crate::Entity::cell_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Id reported by detached entities for their cell.
    pub const NONE: EntityId = EntityId(0);

    /// Allocates the next free entity id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Spatial Types
// ============================================================================

/// A 3D vector with double precision.
///
/// Used for both positions and euler rotations. Distance checks for AOI are
/// plain euclidean distance over all three axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Vec3) -> f64 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn length(&self) -> f64 {
        self.distance(Vec3::ZERO)
    }

    /// Returns a point `t` of the way from `self` towards `target`.
    pub fn lerp(&self, target: Vec3, t: f64) -> Vec3 {
        Vec3 {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
            z: self.z + (target.z - self.z) * t,
        }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Position and orientation of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Vec3::ZERO,
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Something an entity is able to do.
///
/// Logic code dispatches on capabilities instead of concrete entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Has a transform and takes part in distance checks.
    Positioned,
    /// Can walk along navigation paths.
    Movable,
    /// May originate broadcasts to its watchers.
    Broadcaster,
    /// Maintains an interest list and receives AOI updates.
    Watcher,
}

/// The set of capabilities an entity was spawned with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities of a connected player: everything.
    pub fn player() -> Self {
        [
            Capability::Positioned,
            Capability::Movable,
            Capability::Broadcaster,
            Capability::Watcher,
        ]
        .into_iter()
        .collect()
    }

    /// Capabilities of an observed-only object.
    pub fn observed() -> Self {
        [Capability::Positioned].into_iter().collect()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_watcher(&self) -> bool {
        self.contains(Capability::Watcher)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Current unix time in milliseconds.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
