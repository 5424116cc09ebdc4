//! Agent bounds.
//!
//! Every class of navigating entity is described by the shape of its
//! collision volume. Agents with different bounds need structurally
//! different tiles over the same geometry, so [`AgentBounds`] is part of
//! every cache key, database input and query.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Collision volume shape of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CollisionShapeType {
    Aabb,
    Cylinder,
}

impl fmt::Display for CollisionShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionShapeType::Aabb => write!(f, "aabb"),
            CollisionShapeType::Cylinder => write!(f, "cylinder"),
        }
    }
}

/// Shape and half extents of a navigating entity class.
///
/// Equality, ordering and hashing use the exact bit patterns of the half
/// extents, so `AgentBounds` can key ordered and hashed maps.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AgentBounds {
    pub shape_type: CollisionShapeType,
    pub half_extents: Vec3,
}

impl AgentBounds {
    pub fn new(shape_type: CollisionShapeType, half_extents: Vec3) -> Self {
        Self {
            shape_type,
            half_extents,
        }
    }

    /// Horizontal radius used to erode walkable area.
    pub fn radius(&self) -> f32 {
        let extent = self.half_extents.x.max(self.half_extents.y);
        match self.shape_type {
            CollisionShapeType::Aabb => extent * std::f32::consts::SQRT_2,
            CollisionShapeType::Cylinder => extent,
        }
    }

    /// Full agent height.
    pub fn height(&self) -> f32 {
        2.0 * self.half_extents.z
    }

    /// Whether the extents describe a usable agent.
    pub fn is_valid(&self) -> bool {
        self.half_extents.is_finite() && self.half_extents.cmpgt(Vec3::ZERO).all()
    }

    fn bits(&self) -> [u32; 3] {
        [
            self.half_extents.x.to_bits(),
            self.half_extents.y.to_bits(),
            self.half_extents.z.to_bits(),
        ]
    }
}

impl PartialEq for AgentBounds {
    fn eq(&self, other: &Self) -> bool {
        self.shape_type == other.shape_type && self.bits() == other.bits()
    }
}

impl Eq for AgentBounds {}

impl Hash for AgentBounds {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shape_type.hash(state);
        self.bits().hash(state);
    }
}

impl PartialOrd for AgentBounds {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AgentBounds {
    fn cmp(&self, other: &Self) -> Ordering {
        self.shape_type
            .cmp(&other.shape_type)
            .then_with(|| self.half_extents.x.total_cmp(&other.half_extents.x))
            .then_with(|| self.half_extents.y.total_cmp(&other.half_extents.y))
            .then_with(|| self.half_extents.z.total_cmp(&other.half_extents.z))
    }
}

impl fmt::Display for AgentBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {})",
            self.shape_type, self.half_extents.x, self.half_extents.y, self.half_extents.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn test_aabb_radius_covers_diagonal() {
        let agent = AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(10.0, 20.0, 30.0));
        assert!((agent.radius() - 20.0 * std::f32::consts::SQRT_2).abs() < 1e-4);
        assert_eq!(agent.height(), 60.0);
    }

    #[test]
    fn test_cylinder_radius() {
        let agent = AgentBounds::new(CollisionShapeType::Cylinder, Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(agent.radius(), 20.0);
    }

    #[test]
    fn test_agents_key_maps() {
        let a = AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(29.0, 29.0, 66.0));
        let b = AgentBounds::new(CollisionShapeType::Cylinder, Vec3::new(29.0, 29.0, 66.0));
        let c = AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(29.0, 29.0, 66.0));

        let ordered: BTreeSet<_> = [a, b, c].into_iter().collect();
        let hashed: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(ordered.len(), 2);
        assert_eq!(hashed.len(), 2);
        assert!(a < b);
    }

    #[test]
    fn test_invalid_extents() {
        assert!(!AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(0.0, 1.0, 1.0)).is_valid());
        assert!(!AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(f32::NAN, 1.0, 1.0)).is_valid());
        assert!(AgentBounds::new(CollisionShapeType::Aabb, Vec3::ONE).is_valid());
    }
}
