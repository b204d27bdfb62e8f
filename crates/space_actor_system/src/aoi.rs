//! # Area-of-Interest Engine
//!
//! Incremental interest tracking for the members of one cell. Each watcher
//! keeps a cached set of the subjects it saw on the previous update; every
//! update recomputes the set from a [`SpatialIndex`] snapshot and emits the
//! difference as enter/leave events.
//!
//! The relation is asymmetric: W watches S when S is within *W's* radius.
//! Two watchers with different radii can disagree about each other.
//!
//! The engine is purely synchronous bookkeeping. It never touches entities or
//! actors; [`crate::cell::Cell`] turns its output into deliveries.

use crate::spatial::SpatialIndex;
use crate::types::{EntityId, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Snapshot of one member as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoiSubject {
    pub id: EntityId,
    pub position: Vec3,
    /// Interest radius; only used when `is_watcher` is set
    pub radius: f64,
    pub is_watcher: bool,
}

/// One enter or leave change for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AoiEvent {
    pub is_enter: bool,
    pub entity_id: EntityId,
}

impl AoiEvent {
    /// `entity_id` came into range.
    pub fn enter(entity_id: EntityId) -> Self {
        Self { is_enter: true, entity_id }
    }

    /// `entity_id` went out of range or left the cell.
    pub fn leave(entity_id: EntityId) -> Self {
        Self { is_enter: false, entity_id }
    }
}

/// Running counters for an engine.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiStats {
    /// Number of full updates performed
    pub updates: u64,
    pub enter_events: u64,
    pub leave_events: u64,
    /// Watchers currently holding a cached set
    pub watchers: usize,
}

#[derive(Debug, Default)]
pub struct AoiEngine {
    /// watcher -> subjects it currently sees
    watching: HashMap<EntityId, HashSet<EntityId>>,
    /// subject -> watchers that currently see it
    watched_by: HashMap<EntityId, HashSet<EntityId>>,
    stats: AoiStats,
}

impl AoiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes every watcher's interest set.
    ///
    /// Returns one batch per watcher whose set changed, in the order watchers
    /// appear in `subjects`. Enters are ordered nearest first; leaves by id.
    /// Cached state for entities missing from `subjects` is dropped, and they
    /// are reported as leaving every watcher that had them.
    pub fn update(&mut self, subjects: &[AoiSubject]) -> Vec<(EntityId, Vec<AoiEvent>)> {
        let index = SpatialIndex::build(subjects.iter().map(|s| (s.id, s.position)));
        let present: HashSet<EntityId> = subjects.iter().map(|s| s.id).collect();
        let watchers: HashSet<EntityId> = subjects.iter().filter(|s| s.is_watcher).map(|s| s.id).collect();

        // Watchers that vanished without a remove().
        let stale: Vec<EntityId> = self
            .watching
            .keys()
            .copied()
            .filter(|id| !watchers.contains(id))
            .collect();
        for watcher in stale {
            self.drop_watcher(watcher);
        }

        let mut batches = Vec::new();
        for watcher in subjects.iter().filter(|s| s.is_watcher) {
            let mut found = index.query_radius(watcher.position, watcher.radius);
            found.retain(|(id, _)| *id != watcher.id);
            found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            let previous = self.watching.remove(&watcher.id).unwrap_or_default();
            let current: HashSet<EntityId> = found.iter().map(|(id, _)| *id).collect();

            let mut events: Vec<AoiEvent> = found
                .iter()
                .filter(|(id, _)| !previous.contains(id))
                .map(|(id, _)| AoiEvent::enter(*id))
                .collect();

            let mut gone: Vec<EntityId> = previous.difference(&current).copied().collect();
            gone.sort();
            events.extend(gone.iter().map(|id| AoiEvent::leave(*id)));

            for event in &events {
                if event.is_enter {
                    self.watched_by.entry(event.entity_id).or_default().insert(watcher.id);
                    self.stats.enter_events += 1;
                } else {
                    self.unlink(event.entity_id, watcher.id);
                    self.stats.leave_events += 1;
                }
            }

            self.watching.insert(watcher.id, current);
            if !events.is_empty() {
                batches.push((watcher.id, events));
            }
        }

        self.watched_by.retain(|id, _| present.contains(id));
        self.stats.updates += 1;
        self.stats.watchers = self.watching.len();
        batches
    }

    /// Forgets `id` entirely, returning the watchers that were watching it.
    ///
    /// Those watchers are owed a leave event; the caller delivers it. The
    /// removed entity's own interest set is discarded without events.
    pub fn remove(&mut self, id: EntityId) -> Vec<EntityId> {
        self.drop_watcher(id);

        let mut watchers: Vec<EntityId> = self
            .watched_by
            .remove(&id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        watchers.sort();

        for watcher in &watchers {
            if let Some(set) = self.watching.get_mut(watcher) {
                set.remove(&id);
            }
        }
        self.stats.leave_events += watchers.len() as u64;
        self.stats.watchers = self.watching.len();
        watchers
    }

    /// Watchers that currently see `subject`, sorted by id.
    pub fn watchers_of(&self, subject: EntityId) -> Vec<EntityId> {
        let mut watchers: Vec<EntityId> = self
            .watched_by
            .get(&subject)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        watchers.sort();
        watchers
    }

    /// Subjects `watcher` currently sees, sorted by id.
    pub fn watched_by(&self, watcher: EntityId) -> Vec<EntityId> {
        let mut subjects: Vec<EntityId> = self
            .watching
            .get(&watcher)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        subjects.sort();
        subjects
    }

    /// Whether `watcher` had `subject` in range at the last update.
    pub fn is_watching(&self, watcher: EntityId, subject: EntityId) -> bool {
        self.watching
            .get(&watcher)
            .is_some_and(|set| set.contains(&subject))
    }

    /// Cumulative counters since the engine was created.
    pub fn stats(&self) -> AoiStats {
        self.stats.clone()
    }

    fn drop_watcher(&mut self, watcher: EntityId) {
        if let Some(subjects) = self.watching.remove(&watcher) {
            for subject in subjects {
                self.unlink(subject, watcher);
            }
        }
    }

    fn unlink(&mut self, subject: EntityId, watcher: EntityId) {
        if let Some(set) = self.watched_by.get_mut(&subject) {
            set.remove(&watcher);
            if set.is_empty() {
                self.watched_by.remove(&subject);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher(id: u64, x: f64, radius: f64) -> AoiSubject {
        AoiSubject {
            id: EntityId(id),
            position: Vec3::new(x, 0.0, 0.0),
            radius,
            is_watcher: true,
        }
    }

    fn object(id: u64, x: f64) -> AoiSubject {
        AoiSubject {
            id: EntityId(id),
            position: Vec3::new(x, 0.0, 0.0),
            radius: 0.0,
            is_watcher: false,
        }
    }

    fn batch_for(batches: &[(EntityId, Vec<AoiEvent>)], id: u64) -> Option<&Vec<AoiEvent>> {
        batches.iter().find(|(w, _)| *w == EntityId(id)).map(|(_, events)| events)
    }

    #[test]
    fn test_enter_then_quiet() {
        let mut engine = AoiEngine::new();

        let batches = engine.update(&[watcher(1, 0.0, 10.0), watcher(2, 20.0, 10.0)]);
        assert!(batches.is_empty());

        let batches = engine.update(&[watcher(1, 0.0, 10.0), watcher(2, 5.0, 10.0)]);
        assert_eq!(batch_for(&batches, 1), Some(&vec![AoiEvent::enter(EntityId(2))]));
        assert_eq!(batch_for(&batches, 2), Some(&vec![AoiEvent::enter(EntityId(1))]));

        let batches = engine.update(&[watcher(1, 0.0, 10.0), watcher(2, 5.0, 10.0)]);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_relation_is_asymmetric() {
        let mut engine = AoiEngine::new();
        let batches = engine.update(&[watcher(1, 0.0, 10.0), watcher(2, 8.0, 5.0)]);

        assert_eq!(batch_for(&batches, 1), Some(&vec![AoiEvent::enter(EntityId(2))]));
        assert!(batch_for(&batches, 2).is_none());
        assert!(engine.is_watching(EntityId(1), EntityId(2)));
        assert!(!engine.is_watching(EntityId(2), EntityId(1)));
    }

    #[test]
    fn test_boundary_distance_counts_as_inside() {
        let mut engine = AoiEngine::new();
        let batches = engine.update(&[watcher(1, 0.0, 10.0), object(2, 10.0)]);
        assert_eq!(batch_for(&batches, 1), Some(&vec![AoiEvent::enter(EntityId(2))]));
    }

    #[test]
    fn test_leave_when_moving_out() {
        let mut engine = AoiEngine::new();
        engine.update(&[watcher(1, 0.0, 10.0), object(2, 4.0), object(3, 6.0)]);

        let batches = engine.update(&[watcher(1, 0.0, 10.0), object(2, 40.0), object(3, 6.0)]);
        assert_eq!(batch_for(&batches, 1), Some(&vec![AoiEvent::leave(EntityId(2))]));
        assert_eq!(engine.watched_by(EntityId(1)), vec![EntityId(3)]);
        assert_eq!(engine.watchers_of(EntityId(2)), Vec::<EntityId>::new());
    }

    #[test]
    fn test_enters_are_ordered_nearest_first() {
        let mut engine = AoiEngine::new();
        let batches = engine.update(&[
            watcher(1, 0.0, 50.0),
            object(2, 30.0),
            object(3, 10.0),
            object(4, 20.0),
        ]);
        let ids: Vec<u64> = batch_for(&batches, 1)
            .unwrap()
            .iter()
            .map(|e| e.entity_id.as_u64())
            .collect();
        assert_eq!(ids, vec![3, 4, 2]);
    }

    #[test]
    fn test_remove_reports_watchers_and_clears_caches() {
        let mut engine = AoiEngine::new();
        engine.update(&[watcher(1, 0.0, 10.0), watcher(2, 3.0, 10.0), object(3, 5.0)]);

        assert_eq!(engine.watchers_of(EntityId(3)), vec![EntityId(1), EntityId(2)]);
        assert_eq!(engine.remove(EntityId(3)), vec![EntityId(1), EntityId(2)]);
        assert_eq!(engine.watched_by(EntityId(1)), vec![EntityId(2)]);

        // Watcher 2 leaves: its own set goes silently, watcher 1 is owed a leave.
        assert_eq!(engine.remove(EntityId(2)), vec![EntityId(1)]);
        assert!(engine.watched_by(EntityId(2)).is_empty());
        assert!(engine.watchers_of(EntityId(1)).is_empty());

        let batches = engine.update(&[watcher(1, 0.0, 10.0)]);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_missing_subject_is_reported_as_leave() {
        let mut engine = AoiEngine::new();
        engine.update(&[watcher(1, 0.0, 10.0), watcher(2, 1.0, 10.0)]);

        let batches = engine.update(&[watcher(1, 0.0, 10.0)]);
        assert_eq!(batch_for(&batches, 1), Some(&vec![AoiEvent::leave(EntityId(2))]));
        assert_eq!(engine.stats().watchers, 1);
    }

    #[test]
    fn test_cumulative_sets_match_brute_force() {
        let mut engine = AoiEngine::new();
        let mut cumulative: HashMap<EntityId, HashSet<EntityId>> = HashMap::new();

        for step in 0..20u64 {
            let subjects: Vec<AoiSubject> = (1..=30u64)
                .map(|i| AoiSubject {
                    id: EntityId(i),
                    position: Vec3::new(
                        ((i * 13 + step * 7) % 60) as f64,
                        0.0,
                        ((i * 29 + step * 3) % 60) as f64,
                    ),
                    radius: 5.0 + (i % 4) as f64 * 5.0,
                    is_watcher: i % 3 != 0,
                })
                .collect();

            for (watcher, events) in engine.update(&subjects) {
                let mut seen = HashSet::new();
                let set = cumulative.entry(watcher).or_default();
                for event in events {
                    assert!(seen.insert(event.entity_id), "duplicate subject in batch");
                    if event.is_enter {
                        assert!(set.insert(event.entity_id), "enter for cached subject");
                    } else {
                        assert!(set.remove(&event.entity_id), "leave for uncached subject");
                    }
                }
            }

            for w in subjects.iter().filter(|s| s.is_watcher) {
                let expected: HashSet<EntityId> = subjects
                    .iter()
                    .filter(|s| s.id != w.id && s.position.distance(w.position) <= w.radius)
                    .map(|s| s.id)
                    .collect();
                let actual = cumulative.get(&w.id).cloned().unwrap_or_default();
                assert_eq!(actual, expected, "watcher {} at step {}", w.id, step);
            }
        }
    }
}
