//! Object identities and per-object bookkeeping.

use std::fmt;
use std::sync::Arc;

use crate::coord::TilesPositionsRange;
use crate::geometry::{AreaType, CollisionShape, CumulativeAabb, ObjectTransform};
use crate::recast::Version;

/// Generational handle of a geometry object.
///
/// Released indices are reused with a bumped generation, so a handle kept
/// past removal never aliases a newer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Issues [`ObjectId`]s and tracks which are current.
#[derive(Debug, Default)]
pub(crate) struct ObjectIdAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl ObjectIdAllocator {
    pub fn allocate(&mut self) -> ObjectId {
        if let Some(index) = self.free.pop() {
            return ObjectId {
                index,
                generation: self.generations[index as usize],
            };
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        ObjectId {
            index,
            generation: 0,
        }
    }

    pub fn is_current(&self, id: ObjectId) -> bool {
        self.generations.get(id.index as usize) == Some(&id.generation)
    }

    /// Invalidates `id` and makes its index reusable.
    pub fn release(&mut self, id: ObjectId) -> bool {
        if !self.is_current(id) {
            return false;
        }
        let slot = &mut self.generations[id.index as usize];
        *slot = slot.wrapping_add(1);
        self.free.push(id.index);
        true
    }
}

/// Navmesh state observed for an object's tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NavMeshReport {
    /// Manager revision the reported tile was built from.
    pub revision: u64,
    pub navmesh_version: Version,
}

pub(crate) struct ObjectData {
    pub shape: Arc<CollisionShape>,
    pub transform: ObjectTransform,
    pub area_type: AreaType,
    pub range: TilesPositionsRange,
    pub aabb: CumulativeAabb,
    pub generation: u64,
    pub revision: u64,
    pub last_navmesh_reported_change: Option<NavMeshReport>,
    pub last_navmesh_report: Option<NavMeshReport>,
}

impl ObjectData {
    /// Applies a new placement. Returns `false` when nothing changed beyond
    /// the transform tolerance.
    pub fn update(&mut self, transform: &ObjectTransform, area_type: AreaType) -> bool {
        if self.area_type == area_type && self.transform.approx_eq(transform) {
            return false;
        }
        self.transform = *transform;
        self.area_type = area_type;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_ids_are_stale() {
        let mut allocator = ObjectIdAllocator::default();
        let first = allocator.allocate();
        let second = allocator.allocate();
        assert_ne!(first, second);
        assert!(allocator.is_current(first));

        assert!(allocator.release(first));
        assert!(!allocator.is_current(first));
        assert!(!allocator.release(first));

        let reused = allocator.allocate();
        assert_eq!(reused.index(), first.index());
        assert_ne!(reused, first);
        assert!(allocator.is_current(reused));
        assert!(allocator.is_current(second));
    }
}
