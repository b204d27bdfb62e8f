//! # Spatial Index
//!
//! Quadtree over the horizontal plane (x/z) used to find cell members within a
//! radius. Cells rebuild the index from a position snapshot on every AOI tick,
//! so the tree only needs bulk insert and radius queries.
//!
//! Radius checks are closed intervals over full 3D distance: a point exactly
//! `radius` away is included.

use crate::types::{EntityId, Vec3};

/// Maximum depth for quadtree subdivision
const MAX_QUADTREE_DEPTH: u8 = 10;
/// Maximum entries per node before subdivision
const MAX_ENTRIES_PER_NODE: usize = 16;

/// Axis-aligned bounds of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest bounds containing every point, or `None` for no points.
    pub fn enclosing(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Bounds::new(first, first);
        for p in points {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.min.z = bounds.min.z.min(p.z);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
            bounds.max.z = bounds.max.z.max(p.z);
        }
        Some(bounds)
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Whether a sphere touches these bounds.
    pub fn intersects_sphere(&self, center: Vec3, radius: f64) -> bool {
        let closest = Vec3::new(
            center.x.clamp(self.min.x, self.max.x),
            center.y.clamp(self.min.y, self.max.y),
            center.z.clamp(self.min.z, self.max.z),
        );
        center.distance_squared(closest) <= radius * radius
    }
}

#[derive(Debug, Clone, Copy)]
struct SpatialEntry {
    id: EntityId,
    position: Vec3,
}

/// Node in the quadtree
#[derive(Debug)]
struct QuadTreeNode {
    bounds: Bounds,
    entries: Vec<SpatialEntry>,
    /// Child nodes (NW, NE, SW, SE)
    children: Option<Box<[QuadTreeNode; 4]>>,
    depth: u8,
}

impl QuadTreeNode {
    fn new(bounds: Bounds, depth: u8) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            depth,
        }
    }

    fn insert(&mut self, entry: SpatialEntry) -> bool {
        if !self.bounds.contains(entry.position) {
            return false;
        }

        match self.children {
            Some(ref mut children) => children.iter_mut().any(|child| child.insert(entry)),
            None => {
                self.entries.push(entry);
                if self.entries.len() > MAX_ENTRIES_PER_NODE && self.depth < MAX_QUADTREE_DEPTH {
                    self.subdivide();
                }
                true
            }
        }
    }

    fn query_radius(&self, center: Vec3, radius: f64, results: &mut Vec<(EntityId, f64)>) {
        if !self.bounds.intersects_sphere(center, radius) {
            return;
        }

        match self.children {
            Some(ref children) => {
                for child in children.iter() {
                    child.query_radius(center, radius, results);
                }
            }
            None => {
                for entry in &self.entries {
                    let distance = center.distance(entry.position);
                    if distance <= radius {
                        results.push((entry.id, distance));
                    }
                }
            }
        }
    }

    fn subdivide(&mut self) {
        let Bounds { min, max } = self.bounds;
        let mid_x = (min.x + max.x) / 2.0;
        let mid_z = (min.z + max.z) / 2.0;
        let depth = self.depth + 1;

        let children = Box::new([
            // Northwest
            QuadTreeNode::new(Bounds::new(Vec3::new(min.x, min.y, mid_z), Vec3::new(mid_x, max.y, max.z)), depth),
            // Northeast
            QuadTreeNode::new(Bounds::new(Vec3::new(mid_x, min.y, mid_z), Vec3::new(max.x, max.y, max.z)), depth),
            // Southwest
            QuadTreeNode::new(Bounds::new(Vec3::new(min.x, min.y, min.z), Vec3::new(mid_x, max.y, mid_z)), depth),
            // Southeast
            QuadTreeNode::new(Bounds::new(Vec3::new(mid_x, min.y, min.z), Vec3::new(max.x, max.y, mid_z)), depth),
        ]);

        let entries = std::mem::take(&mut self.entries);
        self.children = Some(children);
        for entry in entries {
            self.insert(entry);
        }
    }
}

/// Snapshot index over a set of positioned entities.
#[derive(Debug)]
pub struct SpatialIndex {
    root: Option<QuadTreeNode>,
    len: usize,
}

impl SpatialIndex {
    /// Builds an index sized to fit every given position.
    pub fn build(entries: impl IntoIterator<Item = (EntityId, Vec3)>) -> Self {
        let entries: Vec<SpatialEntry> = entries
            .into_iter()
            .map(|(id, position)| SpatialEntry { id, position })
            .collect();

        let Some(bounds) = Bounds::enclosing(entries.iter().map(|e| e.position)) else {
            return Self { root: None, len: 0 };
        };

        let mut root = QuadTreeNode::new(bounds, 0);
        let mut len = 0;
        for entry in entries {
            if root.insert(entry) {
                len += 1;
            }
        }
        Self { root: Some(root), len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every entry within `radius` of `center` with its distance.
    pub fn query_radius(&self, center: Vec3, radius: f64) -> Vec<(EntityId, f64)> {
        let mut results = Vec::new();
        if let Some(root) = &self.root {
            root.query_radius(center, radius, &mut results);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.query_radius(Vec3::ZERO, 100.0).is_empty());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let index = SpatialIndex::build(vec![
            (EntityId(1), Vec3::new(0.0, 0.0, 0.0)),
            (EntityId(2), Vec3::new(10.0, 0.0, 0.0)),
            (EntityId(3), Vec3::new(10.001, 0.0, 0.0)),
        ]);

        let mut hits: Vec<EntityId> = index
            .query_radius(Vec3::ZERO, 10.0)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        hits.sort();
        assert_eq!(hits, vec![EntityId(1), EntityId(2)]);
    }

    #[test]
    fn test_subdivided_tree_matches_linear_scan() {
        let mut entries = Vec::new();
        for i in 0..400u64 {
            let x = ((i * 37) % 200) as f64 - 100.0;
            let z = ((i * 91) % 200) as f64 - 100.0;
            let y = (i % 7) as f64;
            entries.push((EntityId(i + 1), Vec3::new(x, y, z)));
        }
        let index = SpatialIndex::build(entries.clone());
        assert_eq!(index.len(), 400);

        let center = Vec3::new(12.0, 3.0, -20.0);
        let radius = 35.0;
        let mut from_tree: Vec<EntityId> = index
            .query_radius(center, radius)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        from_tree.sort();

        let mut expected: Vec<EntityId> = entries
            .iter()
            .filter(|(_, p)| p.distance(center) <= radius)
            .map(|(id, _)| *id)
            .collect();
        expected.sort();

        assert_eq!(from_tree, expected);
    }

    #[test]
    fn test_coincident_points_do_not_recurse_forever() {
        let entries: Vec<_> = (1..=100u64).map(|i| (EntityId(i), Vec3::new(5.0, 5.0, 5.0))).collect();
        let index = SpatialIndex::build(entries);
        assert_eq!(index.query_radius(Vec3::new(5.0, 5.0, 5.0), 0.0).len(), 100);
    }
}
