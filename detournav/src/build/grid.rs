//! Grid rasterizing tile builder.
//!
//! Samples the top walkable surface of a tile on the navmesh cell grid:
//!
//! 1. Every cell of the tile plus its border gets the highest surface
//!    among object triangles, heightfields and flat terrain.
//! 2. Triangles steeper than `max_slope` make the cell unwalkable, water
//!    above the surface turns the cell into a swimmable water cell.
//! 3. Walkable area is eroded by the agent radius so agents keep clear of
//!    walls and ledges.
//! 4. The border is cropped away.

use glam::{Vec2, Vec3};

use super::{BuildError, PreparedNavMeshData, TileBuilder};
use crate::agent::AgentBounds;
use crate::coord::{make_tile_bounds, TilePosition};
use crate::geometry::AreaType;
use crate::recast::RecastMesh;
use crate::settings::RecastSettings;

/// Upper bound on cells per grid side.
const MAX_GRID_SIZE: usize = 4096;

#[derive(Clone, Copy)]
struct Sample {
    height: f32,
    area: AreaType,
}

const EMPTY: Sample = Sample {
    height: f32::NEG_INFINITY,
    area: AreaType::Null,
};

/// Default [`TileBuilder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GridTileBuilder;

impl GridTileBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TileBuilder for GridTileBuilder {
    fn build(
        &self,
        recast_mesh: &RecastMesh,
        _worldspace: &str,
        tile: TilePosition,
        agent: &AgentBounds,
        settings: &RecastSettings,
    ) -> Result<Option<PreparedNavMeshData>, BuildError> {
        if settings.tile_size <= 0 || settings.border_size < 0 {
            return Err(BuildError::InvalidSettings(format!(
                "tile size {} border size {}",
                settings.tile_size, settings.border_size
            )));
        }
        let cell_size = settings.real_cell_size();
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(BuildError::InvalidSettings(format!("cell size {cell_size}")));
        }

        let tile_size = settings.tile_size as usize;
        let border = settings.border_size as usize;
        let grid_size = tile_size + 2 * border;
        if grid_size > MAX_GRID_SIZE {
            return Err(BuildError::InvalidSettings(format!(
                "grid of {grid_size} cells per side"
            )));
        }

        let tile_bounds = make_tile_bounds(settings, tile);
        let origin = tile_bounds.min - Vec2::splat(border as f32 * cell_size);
        let grid = Grid {
            size: grid_size,
            origin,
            cell_size,
        };

        let mut samples = vec![EMPTY; grid_size * grid_size];
        rasterize_terrain(recast_mesh, &grid, &mut samples);
        rasterize_triangles(recast_mesh, &grid, settings, &mut samples);
        apply_water(recast_mesh, &grid, agent, settings, &mut samples);

        let radius_cells = (agent.radius() / cell_size).ceil().max(0.0) as usize;
        let samples = erode(&samples, grid_size, radius_cells);

        let mut heights = Vec::with_capacity(tile_size * tile_size);
        let mut areas = Vec::with_capacity(tile_size * tile_size);
        for row in border..border + tile_size {
            for column in border..border + tile_size {
                let sample = samples[row * grid_size + column];
                if sample.area == AreaType::Null {
                    heights.push(0.0);
                    areas.push(AreaType::Null);
                } else {
                    heights.push(sample.height);
                    areas.push(sample.area);
                }
            }
        }

        if areas.iter().all(|a| *a == AreaType::Null) {
            return Ok(None);
        }

        Ok(Some(PreparedNavMeshData {
            user_id: 0,
            tile,
            cell_size,
            size: tile_size,
            origin: tile_bounds.min,
            heights,
            areas,
        }))
    }
}

struct Grid {
    size: usize,
    origin: Vec2,
    cell_size: f32,
}

impl Grid {
    fn center(&self, column: usize, row: usize) -> Vec2 {
        self.origin + (Vec2::new(column as f32, row as f32) + 0.5) * self.cell_size
    }

    /// Inclusive cell index range whose centers may fall in `[min, max]`.
    fn cells(&self, min: f32, max: f32, origin: f32) -> Option<(usize, usize)> {
        let first = ((min - origin) / self.cell_size - 0.5).ceil();
        let last = ((max - origin) / self.cell_size - 0.5).floor();
        let limit = (self.size - 1) as f32;
        if last < 0.0 || first > limit || first > last {
            return None;
        }
        Some((first.max(0.0) as usize, last.min(limit) as usize))
    }
}

fn raise(sample: &mut Sample, height: f32, area: AreaType) {
    if height >= sample.height {
        sample.height = height;
        sample.area = area;
    }
}

fn rasterize_terrain(recast_mesh: &RecastMesh, grid: &Grid, samples: &mut [Sample]) {
    if recast_mesh.heightfields().is_empty() && recast_mesh.flat_heightfields().is_empty() {
        return;
    }
    for row in 0..grid.size {
        for column in 0..grid.size {
            let point = grid.center(column, row);
            let sample = &mut samples[row * grid.size + column];
            for heightfield in recast_mesh.heightfields() {
                if let Some(height) = heightfield.height_at(point) {
                    raise(sample, height, AreaType::Ground);
                }
            }
            for flat in recast_mesh.flat_heightfields() {
                if let Some(height) = flat.height_at(point) {
                    raise(sample, height, AreaType::Ground);
                }
            }
        }
    }
}

fn rasterize_triangles(
    recast_mesh: &RecastMesh,
    grid: &Grid,
    settings: &RecastSettings,
    samples: &mut [Sample],
) {
    let walkable_normal_z = settings.max_slope.to_radians().cos();
    for (vertices, area_type) in recast_mesh.mesh().triangles() {
        let normal = (vertices[1] - vertices[0]).cross(vertices[2] - vertices[0]);
        let length = normal.length();
        if !(length > f32::EPSILON) {
            continue;
        }
        let walkable = area_type != AreaType::Null && (normal.z / length).abs() >= walkable_normal_z;
        let area = if walkable { area_type } else { AreaType::Null };

        let min = vertices[0].min(vertices[1]).min(vertices[2]);
        let max = vertices[0].max(vertices[1]).max(vertices[2]);
        let Some((first_column, last_column)) = grid.cells(min.x, max.x, grid.origin.x) else {
            continue;
        };
        let Some((first_row, last_row)) = grid.cells(min.y, max.y, grid.origin.y) else {
            continue;
        };

        for row in first_row..=last_row {
            for column in first_column..=last_column {
                let point = grid.center(column, row);
                if let Some(height) = height_on_triangle(&vertices, point) {
                    raise(&mut samples[row * grid.size + column], height, area);
                }
            }
        }
    }
}

/// Height of the triangle above `point`, `None` when the point projects
/// outside it.
fn height_on_triangle(vertices: &[Vec3; 3], point: Vec2) -> Option<f32> {
    let a = vertices[0].truncate();
    let b = vertices[1].truncate();
    let c = vertices[2].truncate();
    let denominator = (b - a).perp_dot(c - a);
    if denominator.abs() <= f32::EPSILON {
        return None;
    }
    let u = (c - point).perp_dot(a - point) / denominator;
    let v = (a - point).perp_dot(b - point) / denominator;
    let w = 1.0 - u - v;
    const TOLERANCE: f32 = -1e-5;
    if u < TOLERANCE || v < TOLERANCE || w < TOLERANCE {
        return None;
    }
    Some(w * vertices[0].z + u * vertices[1].z + v * vertices[2].z)
}

fn apply_water(
    recast_mesh: &RecastMesh,
    grid: &Grid,
    agent: &AgentBounds,
    settings: &RecastSettings,
    samples: &mut [Sample],
) {
    if recast_mesh.water().is_empty() {
        return;
    }
    // Agents swim with part of their height under the surface.
    let swim_depth = agent.height() * settings.swim_height_scale;
    for row in 0..grid.size {
        for column in 0..grid.size {
            let point = grid.center(column, row);
            let sample = &mut samples[row * grid.size + column];
            for water in recast_mesh.water() {
                if !water.covers(point) {
                    continue;
                }
                let level = water.water.level;
                let underwater = sample.height < level - swim_depth;
                if sample.height == f32::NEG_INFINITY || underwater {
                    sample.height = level;
                    sample.area = AreaType::Water;
                }
            }
        }
    }
}

/// Clears walkable cells within `radius` cells of an unwalkable one.
///
/// Cells outside the grid do not erode.
fn erode(samples: &[Sample], size: usize, radius: usize) -> Vec<Sample> {
    if radius == 0 {
        return samples.to_vec();
    }
    let radius = radius as isize;
    let size_i = size as isize;
    let mut result = samples.to_vec();
    for row in 0..size_i {
        for column in 0..size_i {
            let index = (row * size_i + column) as usize;
            if samples[index].area == AreaType::Null {
                continue;
            }
            let near_blocked = (-radius..=radius).any(|dy| {
                (-radius..=radius).any(|dx| {
                    let (x, y) = (column + dx, row + dy);
                    x >= 0
                        && y >= 0
                        && x < size_i
                        && y < size_i
                        && samples[(y * size_i + x) as usize].area == AreaType::Null
                })
            });
            if near_blocked {
                result[index].area = AreaType::Null;
            }
        }
    }
    result
}
