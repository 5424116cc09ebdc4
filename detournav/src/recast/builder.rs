//! Assembles a [`RecastMesh`] for one tile.

use std::cmp::Ordering;
use std::sync::Arc;

use glam::{IVec2, Vec3};

use super::{
    CellWater, FlatHeightfield, Heightfield, Mesh, MeshSource, RecastMesh, Version, Water,
};
use crate::coord::TileBounds;
use crate::geometry::{
    cell_bounds, AreaType, CollisionShape, HeightfieldShape, HeightfieldSurface, ObjectTransform,
};

struct Triangle {
    vertices: [Vec3; 3],
    area_type: AreaType,
}

/// Collects the geometry overlapping one tile.
///
/// Everything added is clipped to the tile bounds (border included) and
/// sorted on [`create`](Self::create), so the same inputs in any order
/// produce the same mesh and fingerprint.
pub struct RecastMeshBuilder {
    bounds: TileBounds,
    triangles: Vec<Triangle>,
    water: Vec<CellWater>,
    heightfields: Vec<Heightfield>,
    flat_heightfields: Vec<FlatHeightfield>,
    mesh_sources: Vec<MeshSource>,
}

impl RecastMeshBuilder {
    pub fn new(bounds: TileBounds) -> Self {
        Self {
            bounds,
            triangles: Vec::new(),
            water: Vec::new(),
            heightfields: Vec::new(),
            flat_heightfields: Vec::new(),
            mesh_sources: Vec::new(),
        }
    }

    /// Adds the triangles of a placed shape that touch the tile.
    pub fn add_object(
        &mut self,
        shape: &Arc<CollisionShape>,
        transform: &ObjectTransform,
        area_type: AreaType,
    ) {
        for vertices in shape.triangles(transform) {
            let min = vertices[0].min(vertices[1]).min(vertices[2]).truncate();
            let max = vertices[0].max(vertices[1]).max(vertices[2]).truncate();
            if self.bounds.intersects(min, max) {
                self.triangles.push(Triangle {
                    vertices,
                    area_type,
                });
            }
        }
        self.mesh_sources.push(MeshSource {
            shape: Arc::clone(shape),
            transform: *transform,
            area_type,
        });
    }

    pub fn add_water(&mut self, cell_position: IVec2, water: Water) {
        self.water.push(CellWater {
            cell_position,
            water,
        });
    }

    pub fn add_heightfield(&mut self, cell_position: IVec2, cell_size: i32, shape: &HeightfieldShape) {
        match shape {
            HeightfieldShape::Plane { height } => self.flat_heightfields.push(FlatHeightfield {
                cell_position,
                cell_size,
                height: *height,
            }),
            HeightfieldShape::Surface(surface) => {
                if let Some(heightfield) = self.crop(cell_position, cell_size, surface) {
                    self.heightfields.push(heightfield);
                }
            }
        }
    }

    /// Keeps the sample block covering the tile bounds.
    fn crop(
        &self,
        cell_position: IVec2,
        cell_size: i32,
        surface: &HeightfieldSurface,
    ) -> Option<Heightfield> {
        if surface.size < 2 || surface.heights.len() != surface.size * surface.size {
            return None;
        }
        let (origin, _) = cell_bounds(cell_position, cell_size);
        let step = cell_size as f32 / (surface.size - 1) as f32;
        let last = (surface.size - 1) as f32;
        let to_index = |value: f32, round: fn(f32) -> f32| round(value / step).clamp(0.0, last) as usize;

        let min = self.bounds.min - origin;
        let max = self.bounds.max - origin;
        let min_x = to_index(min.x, f32::floor);
        let min_y = to_index(min.y, f32::floor);
        let max_x = to_index(max.x, f32::ceil);
        let max_y = to_index(max.y, f32::ceil);
        if min_x >= max_x || min_y >= max_y {
            return None;
        }

        let columns = max_x - min_x + 1;
        let rows = max_y - min_y + 1;
        let mut heights = Vec::with_capacity(columns * rows);
        for row in min_y..=max_y {
            let start = row * surface.size + min_x;
            heights.extend_from_slice(&surface.heights[start..start + columns]);
        }
        let min_height = heights.iter().copied().fold(f32::INFINITY, f32::min);
        let max_height = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        Some(Heightfield {
            cell_position,
            cell_size,
            original_size: surface.size,
            min_x,
            min_y,
            columns,
            rows,
            min_height,
            max_height,
            heights,
        })
    }

    /// Freezes the collected geometry into a snapshot stamped with `version`.
    pub fn create(mut self, version: Version) -> RecastMesh {
        self.triangles.sort_by(|a, b| {
            a.area_type
                .cmp(&b.area_type)
                .then_with(|| cmp_triangle(&a.vertices, &b.vertices))
        });

        let mut vertices: Vec<Vec3> = self
            .triangles
            .iter()
            .flat_map(|t| t.vertices)
            .collect();
        vertices.sort_by(cmp_vec3);
        vertices.dedup_by(|a, b| cmp_vec3(a, b) == Ordering::Equal);

        let mut indices = Vec::with_capacity(self.triangles.len() * 3);
        let mut area_types = Vec::with_capacity(self.triangles.len());
        for triangle in &self.triangles {
            for vertex in &triangle.vertices {
                if let Ok(index) = vertices.binary_search_by(|v| cmp_vec3(v, vertex)) {
                    indices.push(index as u32);
                }
            }
            area_types.push(triangle.area_type);
        }

        self.water
            .sort_by_key(|w| (w.cell_position.x, w.cell_position.y));
        self.heightfields
            .sort_by_key(|h| (h.cell_position.x, h.cell_position.y));
        self.flat_heightfields
            .sort_by_key(|h| (h.cell_position.x, h.cell_position.y));

        RecastMesh::new(
            version,
            Mesh {
                indices,
                vertices,
                area_types,
            },
            self.water,
            self.heightfields,
            self.flat_heightfields,
            self.mesh_sources,
        )
    }
}

fn cmp_vec3(a: &Vec3, b: &Vec3) -> Ordering {
    a.x.total_cmp(&b.x)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.z.total_cmp(&b.z))
}

fn cmp_triangle(a: &[Vec3; 3], b: &[Vec3; 3]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(a, b)| cmp_vec3(a, b))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn bounds() -> TileBounds {
        TileBounds {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(100.0, 100.0),
        }
    }

    #[test]
    fn test_object_outside_bounds_adds_no_triangles() {
        let shape = Arc::new(CollisionShape::new_box(Vec3::splat(1.0)));
        let mut builder = RecastMeshBuilder::new(bounds());
        builder.add_object(
            &shape,
            &ObjectTransform::from_position(Vec3::new(500.0, 500.0, 0.0)),
            AreaType::Ground,
        );
        let mesh = builder.create(Version::default());
        assert!(mesh.mesh().indices.is_empty());
        assert_eq!(mesh.mesh_sources().len(), 1);
    }

    #[test]
    fn test_insertion_order_does_not_change_fingerprint() {
        let a = Arc::new(CollisionShape::new_box(Vec3::splat(1.0)));
        let b = Arc::new(CollisionShape::new_box(Vec3::splat(2.0)));
        let ta = ObjectTransform::from_position(Vec3::new(10.0, 10.0, 0.0));
        let tb = ObjectTransform::from_position(Vec3::new(50.0, 50.0, 0.0));

        let mut first = RecastMeshBuilder::new(bounds());
        first.add_object(&a, &ta, AreaType::Ground);
        first.add_object(&b, &tb, AreaType::Ground);
        let mut second = RecastMeshBuilder::new(bounds());
        second.add_object(&b, &tb, AreaType::Ground);
        second.add_object(&a, &ta, AreaType::Ground);

        let first = first.create(Version::default());
        let second = second.create(Version::new(0, 1));
        assert!(first.same_content(&second));
        assert_eq!(first.mesh().vertices.len(), 16);
        assert_eq!(first.mesh().indices.len(), 24 * 3);
    }

    #[test]
    fn test_heightfield_is_cropped_to_bounds() {
        let size = 5;
        let heights: Vec<f32> = (0..size * size).map(|i| i as f32).collect();
        let surface = HeightfieldSurface::new(heights, size).unwrap();
        let mut builder = RecastMeshBuilder::new(TileBounds {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(100.0, 100.0),
        });
        builder.add_heightfield(IVec2::ZERO, 400, &HeightfieldShape::Surface(surface));
        let mesh = builder.create(Version::default());
        let heightfield = &mesh.heightfields()[0];
        assert_eq!((heightfield.min_x, heightfield.min_y), (0, 0));
        assert_eq!((heightfield.columns, heightfield.rows), (2, 2));
        assert_eq!(heightfield.heights, vec![0.0, 1.0, 5.0, 6.0]);
        assert_eq!(heightfield.height_at(Vec2::new(50.0, 0.0)), Some(0.5));
    }

    #[test]
    fn test_heightfield_outside_bounds_is_skipped() {
        let surface = HeightfieldSurface::new(vec![0.0; 4], 2).unwrap();
        let mut builder = RecastMeshBuilder::new(bounds());
        builder.add_heightfield(IVec2::new(5, 5), 100, &HeightfieldShape::Surface(surface));
        assert!(builder.create(Version::default()).is_empty());
    }
}
