//! Row identifiers and records of the navmesh database.

use std::fmt;

/// Persisted tile row id, independent of the tile position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub i64);

/// Persisted shape row id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub i64);

/// Format version of persisted tile data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileVersion(pub i64);

impl TileId {
    pub fn next(self) -> TileId {
        TileId(self.0 + 1)
    }
}

impl ShapeId {
    pub fn next(self) -> ShapeId {
        ShapeId(self.0 + 1)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Existence record of a tile row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub tile_id: TileId,
    pub version: TileVersion,
}

/// Full tile row with decompressed data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileData {
    pub tile_id: TileId,
    pub version: TileVersion,
    pub data: Vec<u8>,
}
