//! Terrain heightfields.
//!
//! A heightfield covers one square cell `[p * s, p * s + s]` on both axes,
//! where `p` is the cell position and `s` the cell size in world units.
//! Samples are stored row-major: `heights[row * size + col]` with columns
//! along `x` and rows along `y`, spaced `s / (size - 1)` apart.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

/// Cell size marking a heightfield or water plane that covers every tile.
pub const INFINITE_CELL_SIZE: i32 = i32::MAX;

/// Sampled terrain surface of one cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightfieldSurface {
    pub heights: Vec<f32>,
    /// Samples per side.
    pub size: usize,
    pub min_height: f32,
    pub max_height: f32,
}

impl HeightfieldSurface {
    /// Builds a surface from square row-major samples, deriving the height
    /// range. `None` unless `heights` holds `size * size` finite values with
    /// `size >= 2`.
    pub fn new(heights: Vec<f32>, size: usize) -> Option<Self> {
        if size < 2 || heights.len() != size * size || !heights.iter().all(|h| h.is_finite()) {
            return None;
        }
        let min_height = heights.iter().copied().fold(f32::INFINITY, f32::min);
        let max_height = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Some(Self {
            heights,
            size,
            min_height,
            max_height,
        })
    }
}

/// Terrain input for one cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HeightfieldShape {
    Surface(HeightfieldSurface),
    /// Flat terrain at a fixed height.
    Plane { height: f32 },
}

impl HeightfieldShape {
    pub fn min_height(&self) -> f32 {
        match self {
            HeightfieldShape::Surface(surface) => surface.min_height,
            HeightfieldShape::Plane { height } => *height,
        }
    }

    pub fn max_height(&self) -> f32 {
        match self {
            HeightfieldShape::Surface(surface) => surface.max_height,
            HeightfieldShape::Plane { height } => *height,
        }
    }
}

/// World-space horizontal bounds of a cell.
pub fn cell_bounds(cell_position: IVec2, cell_size: i32) -> (Vec2, Vec2) {
    let size = cell_size as f32;
    let min = Vec2::new(cell_position.x as f32 * size, cell_position.y as f32 * size);
    (min, min + Vec2::splat(size))
}

/// Bilinear sample of a row-major grid at fractional sample coordinates.
///
/// Coordinates are clamped to the grid.
pub fn sample_bilinear(heights: &[f32], columns: usize, rows: usize, col: f32, row: f32) -> Option<f32> {
    if columns == 0 || rows == 0 || heights.len() < columns * rows {
        return None;
    }
    let col = col.clamp(0.0, (columns - 1) as f32);
    let row = row.clamp(0.0, (rows - 1) as f32);
    let c0 = col.floor() as usize;
    let r0 = row.floor() as usize;
    let c1 = (c0 + 1).min(columns - 1);
    let r1 = (r0 + 1).min(rows - 1);
    let fc = col - c0 as f32;
    let fr = row - r0 as f32;

    let at = |r: usize, c: usize| heights[r * columns + c];
    let bottom = at(r0, c0) * (1.0 - fc) + at(r0, c1) * fc;
    let top = at(r1, c0) * (1.0 - fc) + at(r1, c1) * fc;
    Some(bottom * (1.0 - fr) + top * fr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_derives_range() {
        let surface = HeightfieldSurface::new(vec![0.0, -5.0, 3.0, 1.0], 2).unwrap();
        assert_eq!(surface.min_height, -5.0);
        assert_eq!(surface.max_height, 3.0);
        assert!(HeightfieldSurface::new(vec![0.0; 3], 2).is_none());
    }

    #[test]
    fn test_bilinear_sample() {
        let heights = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(sample_bilinear(&heights, 2, 2, 0.5, 0.0), Some(5.0));
        assert_eq!(sample_bilinear(&heights, 2, 2, 0.5, 0.5), Some(15.0));
        assert_eq!(sample_bilinear(&heights, 2, 2, 5.0, 5.0), Some(30.0));
    }

    #[test]
    fn test_cell_bounds() {
        let (min, max) = cell_bounds(IVec2::new(-1, 2), 8192);
        assert_eq!(min, Vec2::new(-8192.0, 16384.0));
        assert_eq!(max, Vec2::new(0.0, 24576.0));
    }
}
