//! Navigation boundary.
//!
//! Pathfinding is an external service: the runtime only asks it for waypoints
//! between two points. [`DirectNavigator`] is a stand-in that walks in a
//! straight line once a map is loaded.

use crate::types::Vec3;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Pathfinding backend shared by every [`crate::Mover`].
pub trait Navigator: Send + Sync {
    /// Loads the navigation data at `path`. Returns `false` on failure.
    fn load_map(&self, path: &str) -> bool;

    /// Releases the loaded data. Later queries find no path.
    fn unload_map(&self);

    /// Waypoints from `start` to `end`, excluding `start` and ending at the
    /// reachable point closest to `end`. `None` when no path exists.
    fn find_path(&self, start: Vec3, end: Vec3) -> Option<Vec<Vec3>>;
}

/// Navigator with no obstacles: the path is the destination itself.
#[derive(Debug, Default)]
pub struct DirectNavigator {
    map: RwLock<Option<String>>,
}

impl DirectNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A navigator with `path` already loaded.
    pub fn loaded(path: &str) -> Self {
        let navigator = Self::new();
        navigator.load_map(path);
        navigator
    }

    /// Path of the loaded map, if any.
    pub fn map(&self) -> Option<String> {
        self.map.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Navigator for DirectNavigator {
    fn load_map(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        *self.map.write().unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
        info!("🗺️ Loaded navigation map {}", path);
        true
    }

    fn unload_map(&self) {
        if let Some(path) = self.map.write().unwrap_or_else(PoisonError::into_inner).take() {
            debug!("Unloaded navigation map {}", path);
        }
    }

    fn find_path(&self, start: Vec3, end: Vec3) -> Option<Vec<Vec3>> {
        self.map()?;
        if start == end {
            return Some(Vec::new());
        }
        Some(vec![end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_path_without_map() {
        let navigator = DirectNavigator::new();
        assert!(navigator.find_path(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)).is_none());
        assert!(!navigator.load_map(""));

        assert!(navigator.load_map("maps/arena.nav"));
        assert_eq!(
            navigator.find_path(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)),
            Some(vec![Vec3::new(1.0, 0.0, 0.0)])
        );

        navigator.unload_map();
        assert!(navigator.map().is_none());
        assert!(navigator.find_path(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)).is_none());
    }
}
