//! Tile building.
//!
//! [`TileBuilder`] is the seam between the pipeline and the algorithm that
//! turns a tile's geometry into walkable data. The pipeline only caches,
//! persists and commits [`PreparedNavMeshData`]; [`GridTileBuilder`] is
//! the built-in implementation.

mod grid;
pub mod serialization;

pub use grid::GridTileBuilder;

use std::mem::size_of;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentBounds;
use crate::coord::TilePosition;
use crate::geometry::AreaType;
use crate::recast::RecastMesh;
use crate::settings::RecastSettings;

/// Errors raised while building or decoding a tile.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Settings that make the tile grid meaningless
    #[error("Invalid build settings: {0}")]
    InvalidSettings(String),

    /// Tile data could not be encoded or decoded
    #[error("Tile data serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    /// Decoded tile data of a foreign or outdated format
    #[error("Invalid tile data: {0}")]
    InvalidData(String),

    /// The builder gave up on the tile
    #[error("Tile build failed: {0}")]
    Failed(String),
}

/// Built walkable data of one tile for one agent.
///
/// The tile is a `size x size` grid of square cells starting at `origin`.
/// Each cell holds the height of its walkable surface and its area type;
/// cells with [`AreaType::Null`] are not walkable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreparedNavMeshData {
    /// Database tile id this data was stored under, `0` when never stored.
    pub user_id: i64,
    pub tile: TilePosition,
    pub cell_size: f32,
    pub size: usize,
    pub origin: Vec2,
    /// Row-major surface heights, rows along `y`.
    pub heights: Vec<f32>,
    pub areas: Vec<AreaType>,
}

impl PreparedNavMeshData {
    /// Approximate memory held, in bytes.
    pub fn size(&self) -> usize {
        size_of::<Self>()
            + self.heights.len() * size_of::<f32>()
            + self.areas.len() * size_of::<AreaType>()
    }

    /// Equality of the built content, ignoring `user_id`.
    pub fn same_content(&self, other: &PreparedNavMeshData) -> bool {
        self.tile == other.tile
            && self.cell_size == other.cell_size
            && self.size == other.size
            && self.origin == other.origin
            && self.heights == other.heights
            && self.areas == other.areas
    }

    pub fn walkable_cells(&self) -> usize {
        self.areas.iter().filter(|a| **a != AreaType::Null).count()
    }

    /// Area and height of a local cell.
    pub fn cell(&self, column: usize, row: usize) -> Option<(AreaType, f32)> {
        if column >= self.size || row >= self.size {
            return None;
        }
        let index = row * self.size + column;
        Some((*self.areas.get(index)?, *self.heights.get(index)?))
    }
}

/// Builds walkable tile data from geometry.
///
/// Returns `Ok(None)` when the tile has no walkable surface for the agent.
pub trait TileBuilder: Send + Sync {
    fn build(
        &self,
        recast_mesh: &RecastMesh,
        worldspace: &str,
        tile: TilePosition,
        agent: &AgentBounds,
        settings: &RecastSettings,
    ) -> Result<Option<PreparedNavMeshData>, BuildError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(user_id: i64) -> PreparedNavMeshData {
        PreparedNavMeshData {
            user_id,
            tile: TilePosition::new(0, 0),
            cell_size: 1.0,
            size: 2,
            origin: Vec2::ZERO,
            heights: vec![0.0; 4],
            areas: vec![AreaType::Ground, AreaType::Null, AreaType::Water, AreaType::Null],
        }
    }

    #[test]
    fn test_same_content_ignores_user_id() {
        assert!(data(0).same_content(&data(12)));
        assert_ne!(data(0), data(12));
    }

    #[test]
    fn test_cells() {
        let data = data(0);
        assert_eq!(data.walkable_cells(), 2);
        assert_eq!(data.cell(0, 1), Some((AreaType::Water, 0.0)));
        assert_eq!(data.cell(2, 0), None);
        assert!(data.size() > 4 * size_of::<f32>());
    }
}
