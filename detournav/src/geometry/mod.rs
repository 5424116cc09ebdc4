//! Geometry inputs consumed by the navmesh pipeline.
//!
//! Shapes, heightfields and water arrive already converted from the host
//! application's collision data; this module only describes them and
//! answers bounds queries.

mod aabb;
mod heightfield;
mod shape;

pub use aabb::{Aabb, CumulativeAabb};
pub use heightfield::{
    cell_bounds, sample_bilinear, HeightfieldShape, HeightfieldSurface, INFINITE_CELL_SIZE,
};
pub use shape::{
    AreaType, CollisionShape, ObjectTransform, ShapeKind, ShapeSource, ShapeType,
    TRANSFORM_EPSILON,
};
