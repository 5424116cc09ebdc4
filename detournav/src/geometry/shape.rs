//! Collision shapes and object transforms.

use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;

/// Tolerance below which transform changes are ignored.
pub const TRANSFORM_EPSILON: f32 = 1e-4;

// =============================================================================
// Area Type
// =============================================================================

/// Surface classification of navmesh geometry.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum AreaType {
    /// Not walkable.
    Null = 0,
    Water = 1,
    Door = 2,
    Pathgrid = 3,
    #[default]
    Ground = 63,
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AreaType::Null => "null",
            AreaType::Water => "water",
            AreaType::Door => "door",
            AreaType::Pathgrid => "pathgrid",
            AreaType::Ground => "ground",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Shapes
// =============================================================================

/// Role of a shape in the persisted shapes table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum ShapeType {
    Collision = 1,
    Avoid = 2,
}

/// Where a shape was loaded from; identifies it across runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeSource {
    pub name: String,
    pub hash: Vec<u8>,
}

/// Geometry of a collision shape in its local frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShapeKind {
    Box { half_extents: Vec3 },
    TriangleMesh { vertices: Vec<Vec3>, indices: Vec<u32> },
}

/// Collision shape shared by every object that uses it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionShape {
    pub kind: ShapeKind,
    pub shape_type: ShapeType,
    pub source: Option<ShapeSource>,
}

const BOX_TRIANGLES: [[usize; 3]; 12] = [
    [0, 2, 1],
    [1, 2, 3],
    [4, 5, 6],
    [5, 7, 6],
    [0, 1, 4],
    [1, 5, 4],
    [2, 6, 3],
    [3, 6, 7],
    [0, 4, 2],
    [2, 4, 6],
    [1, 3, 5],
    [3, 7, 5],
];

impl CollisionShape {
    pub fn new_box(half_extents: Vec3) -> Self {
        Self {
            kind: ShapeKind::Box { half_extents },
            shape_type: ShapeType::Collision,
            source: None,
        }
    }

    pub fn new_triangle_mesh(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            kind: ShapeKind::TriangleMesh { vertices, indices },
            shape_type: ShapeType::Collision,
            source: None,
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, hash: Vec<u8>) -> Self {
        self.source = Some(ShapeSource {
            name: name.into(),
            hash,
        });
        self
    }

    pub fn with_shape_type(mut self, shape_type: ShapeType) -> Self {
        self.shape_type = shape_type;
        self
    }

    /// Whether the shape has usable geometry.
    pub fn is_valid(&self) -> bool {
        match &self.kind {
            ShapeKind::Box { half_extents } => {
                half_extents.is_finite() && half_extents.cmpge(Vec3::ZERO).all()
            }
            ShapeKind::TriangleMesh { vertices, indices } => {
                !indices.is_empty()
                    && indices.len() % 3 == 0
                    && indices.iter().all(|&i| (i as usize) < vertices.len())
                    && vertices.iter().all(|v| v.is_finite())
            }
        }
    }

    /// World-space triangles of the shape under `transform`.
    pub fn triangles(&self, transform: &ObjectTransform) -> Vec<[Vec3; 3]> {
        match &self.kind {
            ShapeKind::Box { half_extents } => {
                let corners: Vec<Vec3> = (0..8)
                    .map(|i| {
                        let sign = Vec3::new(
                            if i & 1 == 0 { -1.0 } else { 1.0 },
                            if i & 2 == 0 { -1.0 } else { 1.0 },
                            if i & 4 == 0 { -1.0 } else { 1.0 },
                        );
                        transform.apply(sign * *half_extents)
                    })
                    .collect();
                BOX_TRIANGLES
                    .iter()
                    .map(|t| [corners[t[0]], corners[t[1]], corners[t[2]]])
                    .collect()
            }
            ShapeKind::TriangleMesh { vertices, indices } => indices
                .chunks_exact(3)
                .filter_map(|t| {
                    Some([
                        transform.apply(*vertices.get(t[0] as usize)?),
                        transform.apply(*vertices.get(t[1] as usize)?),
                        transform.apply(*vertices.get(t[2] as usize)?),
                    ])
                })
                .collect(),
        }
    }

    /// World-space bounds under `transform`.
    pub fn aabb(&self, transform: &ObjectTransform) -> Option<Aabb> {
        Aabb::from_points(self.triangles(transform).into_iter().flatten())
    }
}

// =============================================================================
// Object Transform
// =============================================================================

/// Placement of an object in the world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl ObjectTransform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn apply(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (point * self.scale)
    }

    pub fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.rotation.is_finite()
            && self.scale.is_finite()
            && self.scale > 0.0
    }

    /// Equality within [`TRANSFORM_EPSILON`].
    pub fn approx_eq(&self, other: &ObjectTransform) -> bool {
        self.position.abs_diff_eq(other.position, TRANSFORM_EPSILON)
            && (self.rotation.abs_diff_eq(other.rotation, TRANSFORM_EPSILON)
                || self.rotation.abs_diff_eq(-other.rotation, TRANSFORM_EPSILON))
            && (self.scale - other.scale).abs() <= TRANSFORM_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_triangles_span_extents() {
        let shape = CollisionShape::new_box(Vec3::new(1.0, 2.0, 3.0));
        let transform = ObjectTransform::from_position(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(shape.triangles(&transform).len(), 12);
        let aabb = shape.aabb(&transform).unwrap();
        assert_eq!(aabb.min, Vec3::new(9.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(11.0, 2.0, 3.0));
    }

    #[test]
    fn test_transform_scales_then_rotates() {
        let transform = ObjectTransform::from_position(Vec3::new(1.0, 1.0, 0.0))
            .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
            .with_scale(2.0);
        let point = transform.apply(Vec3::X);
        assert!(point.abs_diff_eq(Vec3::new(1.0, 3.0, 0.0), 1e-5));
    }

    #[test]
    fn test_approx_eq_ignores_tiny_moves() {
        let a = ObjectTransform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let b = ObjectTransform::from_position(Vec3::new(1.0, 2.0, 3.00001));
        let c = ObjectTransform::from_position(Vec3::new(1.0, 2.0, 3.1));
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }

    #[test]
    fn test_triangle_mesh_validation() {
        let valid = CollisionShape::new_triangle_mesh(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        let out_of_range = CollisionShape::new_triangle_mesh(vec![Vec3::ZERO, Vec3::X], vec![0, 1, 2]);
        assert!(valid.is_valid());
        assert!(!out_of_range.is_valid());
    }
}
