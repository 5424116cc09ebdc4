//! Per-tile geometry snapshots.
//!
//! A [`RecastMesh`] is the immutable input of one tile build: the triangles,
//! water and terrain overlapping the tile (plus its border), stamped with
//! the manager [`Version`] it was made from and a content fingerprint.
//! Two meshes with equal content build equal tiles regardless of version,
//! which is what the tiles cache and the database key on.

mod builder;

pub use builder::RecastMeshBuilder;

use std::fmt;
use std::sync::Arc;

use glam::{IVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::geometry::{
    cell_bounds, sample_bilinear, AreaType, CollisionShape, ObjectTransform, INFINITE_CELL_SIZE,
};

/// Geometry state stamp.
///
/// `generation` changes with the worldspace, `revision` with every geometry
/// change inside it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Version {
    pub generation: u64,
    pub revision: u64,
}

impl Version {
    pub const fn new(generation: u64, revision: u64) -> Self {
        Self {
            generation,
            revision,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.generation, self.revision)
    }
}

/// Indexed triangle soup with one area type per triangle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub indices: Vec<u32>,
    pub vertices: Vec<Vec3>,
    pub area_types: Vec<AreaType>,
}

impl Mesh {
    pub fn triangles(&self) -> impl Iterator<Item = ([Vec3; 3], AreaType)> + '_ {
        self.indices
            .chunks_exact(3)
            .zip(self.area_types.iter())
            .filter_map(|(t, area_type)| {
                Some((
                    [
                        *self.vertices.get(t[0] as usize)?,
                        *self.vertices.get(t[1] as usize)?,
                        *self.vertices.get(t[2] as usize)?,
                    ],
                    *area_type,
                ))
            })
    }
}

/// Water plane of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Water {
    /// Cell size in world units, [`INFINITE_CELL_SIZE`] for unbounded water.
    pub cell_size: i32,
    pub level: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellWater {
    pub cell_position: IVec2,
    pub water: Water,
}

impl CellWater {
    pub fn covers(&self, point: Vec2) -> bool {
        covers_cell(self.cell_position, self.water.cell_size, point)
    }
}

/// Terrain samples of one cell, cropped to a tile.
///
/// `min_x`/`min_y` locate the cropped block inside the original
/// `original_size x original_size` grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heightfield {
    pub cell_position: IVec2,
    pub cell_size: i32,
    pub original_size: usize,
    pub min_x: usize,
    pub min_y: usize,
    pub columns: usize,
    pub rows: usize,
    pub min_height: f32,
    pub max_height: f32,
    pub heights: Vec<f32>,
}

impl Heightfield {
    fn step(&self) -> f32 {
        self.cell_size as f32 / (self.original_size.max(2) - 1) as f32
    }

    /// Interpolated terrain height, `None` outside the cropped block.
    pub fn height_at(&self, point: Vec2) -> Option<f32> {
        let (origin, _) = cell_bounds(self.cell_position, self.cell_size);
        let step = self.step();
        let col = (point.x - origin.x) / step - self.min_x as f32;
        let row = (point.y - origin.y) / step - self.min_y as f32;
        let max_col = self.columns.saturating_sub(1) as f32;
        let max_row = self.rows.saturating_sub(1) as f32;
        if !(0.0..=max_col).contains(&col) || !(0.0..=max_row).contains(&row) {
            return None;
        }
        sample_bilinear(&self.heights, self.columns, self.rows, col, row)
    }
}

/// Flat terrain of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatHeightfield {
    pub cell_position: IVec2,
    pub cell_size: i32,
    pub height: f32,
}

impl FlatHeightfield {
    pub fn height_at(&self, point: Vec2) -> Option<f32> {
        covers_cell(self.cell_position, self.cell_size, point).then_some(self.height)
    }
}

fn covers_cell(cell_position: IVec2, cell_size: i32, point: Vec2) -> bool {
    if cell_size == INFINITE_CELL_SIZE {
        return true;
    }
    let (min, max) = cell_bounds(cell_position, cell_size);
    min.x <= point.x && point.x <= max.x && min.y <= point.y && point.y <= max.y
}

/// Object that contributed triangles to a mesh.
///
/// Used to describe persisted tile inputs by shape identity instead of by
/// raw triangles.
#[derive(Clone, Debug)]
pub struct MeshSource {
    pub shape: Arc<CollisionShape>,
    pub transform: ObjectTransform,
    pub area_type: AreaType,
}

// =============================================================================
// Recast Mesh
// =============================================================================

/// Immutable geometry snapshot of one tile.
#[derive(Clone, Debug)]
pub struct RecastMesh {
    version: Version,
    mesh: Mesh,
    water: Vec<CellWater>,
    heightfields: Vec<Heightfield>,
    flat_heightfields: Vec<FlatHeightfield>,
    mesh_sources: Vec<MeshSource>,
    fingerprint: [u8; 32],
}

impl RecastMesh {
    pub fn new(
        version: Version,
        mesh: Mesh,
        water: Vec<CellWater>,
        heightfields: Vec<Heightfield>,
        flat_heightfields: Vec<FlatHeightfield>,
        mesh_sources: Vec<MeshSource>,
    ) -> Self {
        let fingerprint = compute_fingerprint(&mesh, &water, &heightfields, &flat_heightfields);
        Self {
            version,
            mesh,
            water,
            heightfields,
            flat_heightfields,
            mesh_sources,
            fingerprint,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn water(&self) -> &[CellWater] {
        &self.water
    }

    pub fn heightfields(&self) -> &[Heightfield] {
        &self.heightfields
    }

    pub fn flat_heightfields(&self) -> &[FlatHeightfield] {
        &self.flat_heightfields
    }

    pub fn mesh_sources(&self) -> &[MeshSource] {
        &self.mesh_sources
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// No geometry of any kind.
    pub fn is_empty(&self) -> bool {
        self.mesh.indices.is_empty()
            && self.water.is_empty()
            && self.heightfields.is_empty()
            && self.flat_heightfields.is_empty()
    }

    /// Content equality, ignoring version and mesh sources.
    pub fn same_content(&self, other: &RecastMesh) -> bool {
        self.fingerprint == other.fingerprint
            && self.mesh == other.mesh
            && self.water == other.water
            && self.heightfields == other.heightfields
            && self.flat_heightfields == other.flat_heightfields
    }

    /// Approximate memory held by the content, in bytes.
    pub fn content_size(&self) -> usize {
        use std::mem::size_of;
        self.mesh.indices.len() * size_of::<u32>()
            + self.mesh.vertices.len() * size_of::<Vec3>()
            + self.mesh.area_types.len() * size_of::<AreaType>()
            + self.water.len() * size_of::<CellWater>()
            + self
                .heightfields
                .iter()
                .map(|h| size_of::<Heightfield>() + h.heights.len() * size_of::<f32>())
                .sum::<usize>()
            + self.flat_heightfields.len() * size_of::<FlatHeightfield>()
    }
}

fn compute_fingerprint(
    mesh: &Mesh,
    water: &[CellWater],
    heightfields: &[Heightfield],
    flat_heightfields: &[FlatHeightfield],
) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update((mesh.indices.len() as u64).to_le_bytes());
    for index in &mesh.indices {
        hasher.update(index.to_le_bytes());
    }
    hasher.update((mesh.vertices.len() as u64).to_le_bytes());
    for vertex in &mesh.vertices {
        for component in vertex.to_array() {
            hasher.update(component.to_le_bytes());
        }
    }
    for area_type in &mesh.area_types {
        hasher.update([*area_type as u8]);
    }

    hasher.update((water.len() as u64).to_le_bytes());
    for w in water {
        hasher.update(w.cell_position.x.to_le_bytes());
        hasher.update(w.cell_position.y.to_le_bytes());
        hasher.update(w.water.cell_size.to_le_bytes());
        hasher.update(w.water.level.to_le_bytes());
    }

    hasher.update((heightfields.len() as u64).to_le_bytes());
    for h in heightfields {
        hasher.update(h.cell_position.x.to_le_bytes());
        hasher.update(h.cell_position.y.to_le_bytes());
        hasher.update(h.cell_size.to_le_bytes());
        for value in [h.original_size, h.min_x, h.min_y, h.columns, h.rows] {
            hasher.update((value as u64).to_le_bytes());
        }
        hasher.update(h.min_height.to_le_bytes());
        hasher.update(h.max_height.to_le_bytes());
        for height in &h.heights {
            hasher.update(height.to_le_bytes());
        }
    }

    hasher.update((flat_heightfields.len() as u64).to_le_bytes());
    for h in flat_heightfields {
        hasher.update(h.cell_position.x.to_le_bytes());
        hasher.update(h.cell_position.y.to_le_bytes());
        hasher.update(h.cell_size.to_le_bytes());
        hasher.update(h.height.to_le_bytes());
    }

    hasher.finalize().into()
}
