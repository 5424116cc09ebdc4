//! Tile grid coordinates.
//!
//! The world is split into square tiles of `RecastSettings::real_tile_size`
//! world units. Tile `(0, 0)` spans `[0, size) x [0, size)` on the
//! horizontal plane; `z` is up and never affects tile membership.
//!
//! ```text
//!   y
//!   ^
//!   |  (-1, 0) | (0, 0) | (1, 0)
//!   | ---------+--------+--------
//!   |  (-1,-1) | (0,-1) | (1,-1)
//!   +------------------------------> x
//! ```

use std::fmt;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::settings::RecastSettings;

// =============================================================================
// Tile Position
// =============================================================================

/// Integer tile coordinate.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TilePosition {
    pub x: i32,
    pub y: i32,
}

impl TilePosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in tiles.
    pub fn distance(&self, other: &TilePosition) -> f32 {
        let dx = (self.x as i64 - other.x as i64) as f32;
        let dy = (self.y as i64 - other.y as i64) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// Manhattan distance in tiles.
    pub fn manhattan_distance(&self, other: &TilePosition) -> i64 {
        (self.x as i64 - other.x as i64).abs() + (self.y as i64 - other.y as i64).abs()
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// Tiles Positions Range
// =============================================================================

/// Half-open rectangle of tiles `[begin, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilesPositionsRange {
    pub begin: TilePosition,
    pub end: TilePosition,
}

impl TilesPositionsRange {
    /// Range covering every representable tile.
    pub const INFINITE: TilesPositionsRange = TilesPositionsRange {
        begin: TilePosition::new(i32::MIN, i32::MIN),
        end: TilePosition::new(i32::MAX, i32::MAX),
    };

    pub const fn new(begin: TilePosition, end: TilePosition) -> Self {
        Self { begin, end }
    }

    pub fn is_empty(&self) -> bool {
        self.begin.x >= self.end.x || self.begin.y >= self.end.y
    }

    pub fn contains(&self, position: TilePosition) -> bool {
        self.begin.x <= position.x
            && position.x < self.end.x
            && self.begin.y <= position.y
            && position.y < self.end.y
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let width = (self.end.x as i64 - self.begin.x as i64) as u64;
        let height = (self.end.y as i64 - self.begin.y as i64) as u64;
        width.saturating_mul(height)
    }

    pub fn intersection(&self, other: &TilesPositionsRange) -> TilesPositionsRange {
        let range = TilesPositionsRange {
            begin: TilePosition::new(self.begin.x.max(other.begin.x), self.begin.y.max(other.begin.y)),
            end: TilePosition::new(self.end.x.min(other.end.x), self.end.y.min(other.end.y)),
        };
        if range.is_empty() {
            TilesPositionsRange::default()
        } else {
            range
        }
    }

    /// Bounding range of both.
    pub fn union(&self, other: &TilesPositionsRange) -> TilesPositionsRange {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        TilesPositionsRange {
            begin: TilePosition::new(self.begin.x.min(other.begin.x), self.begin.y.min(other.begin.y)),
            end: TilePosition::new(self.end.x.max(other.end.x), self.end.y.max(other.end.y)),
        }
    }

    /// Iterates positions row by row in ascending `(x, y)` order.
    pub fn positions(&self) -> impl Iterator<Item = TilePosition> {
        let range = *self;
        let (xs, ys) = if range.is_empty() {
            (0..0, 0..0)
        } else {
            (range.begin.x..range.end.x, range.begin.y..range.end.y)
        };
        xs.flat_map(move |x| ys.clone().map(move |y| TilePosition::new(x, y)))
    }
}

impl fmt::Display for TilesPositionsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

// =============================================================================
// Tile Math
// =============================================================================

/// Horizontal world-space rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl TileBounds {
    pub fn intersects(&self, min: Vec2, max: Vec2) -> bool {
        self.min.x <= max.x && min.x <= self.max.x && self.min.y <= max.y && min.y <= self.max.y
    }

    pub fn contains(&self, point: Vec2) -> bool {
        self.min.x <= point.x && point.x <= self.max.x && self.min.y <= point.y && point.y <= self.max.y
    }
}

/// Tile containing a world position.
pub fn get_tile_position(settings: &RecastSettings, position: Vec3) -> TilePosition {
    let size = settings.real_tile_size();
    TilePosition::new(
        to_tile_coordinate(position.x / size),
        to_tile_coordinate(position.y / size),
    )
}

fn to_tile_coordinate(value: f32) -> i32 {
    // `as` saturates, infinities map to the grid edges.
    value.floor() as i32
}

/// World bounds of a tile.
pub fn make_tile_bounds(settings: &RecastSettings, tile: TilePosition) -> TileBounds {
    let size = settings.real_tile_size();
    let min = Vec2::new(tile.x as f32 * size, tile.y as f32 * size);
    TileBounds {
        min,
        max: min + Vec2::splat(size),
    }
}

/// World bounds of a tile expanded by the border.
pub fn make_real_tile_bounds_with_border(settings: &RecastSettings, tile: TilePosition) -> TileBounds {
    let bounds = make_tile_bounds(settings, tile);
    let border = Vec2::splat(settings.real_border_size());
    TileBounds {
        min: bounds.min - border,
        max: bounds.max + border,
    }
}

/// Tiles touched by a horizontal AABB expanded by the border.
pub fn make_tiles_positions_range(
    settings: &RecastSettings,
    aabb_min: Vec2,
    aabb_max: Vec2,
) -> TilesPositionsRange {
    let border = settings.real_border_size();
    let min = get_tile_position(settings, (aabb_min - Vec2::splat(border)).extend(0.0));
    let max = get_tile_position(settings, (aabb_max + Vec2::splat(border)).extend(0.0));
    TilesPositionsRange::new(
        TilePosition::new(min.x.min(max.x), min.y.min(max.y)),
        TilePosition::new(
            min.x.max(max.x).saturating_add(1),
            min.y.max(max.y).saturating_add(1),
        ),
    )
}

/// Whether a tile falls inside the player-centred tile budget.
///
/// The budget is a disc: a tile is kept while the area of the disc reaching
/// it does not exceed `max_tiles`.
pub fn should_add_tile(changed_tile: TilePosition, player_tile: TilePosition, max_tiles: i32) -> bool {
    let distance = changed_tile.distance(&player_tile);
    let expected_tiles_count = (std::f32::consts::PI * distance * distance).ceil();
    expected_tiles_count <= max_tiles as f32
}

/// Square window around the player enclosing the tile budget disc.
pub fn make_range(player_tile: TilePosition, max_tiles: i32) -> TilesPositionsRange {
    let radius = ((max_tiles.max(0) as f32 / std::f32::consts::PI).sqrt().ceil() as i32) + 1;
    TilesPositionsRange::new(
        TilePosition::new(
            player_tile.x.saturating_sub(radius),
            player_tile.y.saturating_sub(radius),
        ),
        TilePosition::new(
            player_tile.x.saturating_add(radius + 1),
            player_tile.y.saturating_add(radius + 1),
        ),
    )
}
