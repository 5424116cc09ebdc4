//! Navigator settings.
//!
//! Settings are split the same way the pipeline is: [`RecastSettings`] feed
//! tile geometry and the tile builder (and are part of every persisted tile
//! input), [`DetourSettings`] bound the query layer, and the remaining
//! fields of [`Settings`] drive the async updater, caches and database.
//!
//! Distances in [`RecastSettings`] follow the navmesh convention: `cell_size`
//! and `cell_height` are navmesh units and are converted to world units with
//! `recast_scale_factor`, while `max_climb` is already in world units.

pub mod file;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NavigatorError, NavigatorResult};

pub use file::{default_config_path, default_db_path, ConfigError};

/// Default navmesh cell size in navmesh units.
pub const DEFAULT_CELL_SIZE: f32 = 0.2;

/// Default navmesh cell height in navmesh units.
pub const DEFAULT_CELL_HEIGHT: f32 = 0.2;

/// Default tile size in cells.
pub const DEFAULT_TILE_SIZE: i32 = 64;

/// Default border size in cells.
pub const DEFAULT_BORDER_SIZE: i32 = 16;

/// Default conversion factor from world units to navmesh units.
pub const DEFAULT_RECAST_SCALE_FACTOR: f32 = 0.017_647_059;

/// Default maximum step height an agent can climb, in world units.
pub const DEFAULT_MAX_CLIMB: f32 = 34.0;

/// Default maximum walkable slope in degrees.
pub const DEFAULT_MAX_SLOPE: f32 = 49.0;

/// Default fraction of agent height kept above the water surface.
pub const DEFAULT_SWIM_HEIGHT_SCALE: f32 = 0.9;

/// Default minimum region size in cells.
pub const DEFAULT_REGION_MIN_SIZE: i32 = 8;

/// Default number of async updater worker threads.
pub const DEFAULT_UPDATER_THREADS: usize = 1;

/// Default memory budget for built tiles (256 MiB).
pub const DEFAULT_MAX_NAVMESH_TILES_CACHE_SIZE: usize = 256 * 1024 * 1024;

/// Default minimum interval between two rebuilds of the same tile.
pub const DEFAULT_MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// Default Manhattan tile distance used by the required tiles barrier.
pub const DEFAULT_WAIT_UNTIL_MIN_DISTANCE_TO_PLAYER: i32 = 5;

/// Default number of tiles kept around the player.
pub const DEFAULT_MAX_TILES_NUMBER: i32 = 512;

/// Default navmesh database size limit (2 GiB).
pub const DEFAULT_MAX_NAVMESHDB_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default node budget for a single path search.
pub const DEFAULT_MAX_NAVMESH_QUERY_NODES: usize = 2048;

/// Default maximum number of cells in a raw path.
pub const DEFAULT_MAX_POLYGON_PATH_SIZE: usize = 1024;

/// Default maximum number of points in a returned path.
pub const DEFAULT_MAX_SMOOTH_PATH_SIZE: usize = 1024;

// =============================================================================
// Recast Settings
// =============================================================================

/// Geometry and tile build settings.
///
/// Serialized into every persisted tile input, so changing any of them
/// invalidates previously stored tiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecastSettings {
    pub cell_size: f32,
    pub cell_height: f32,
    pub tile_size: i32,
    pub border_size: i32,
    pub recast_scale_factor: f32,
    pub max_climb: f32,
    pub max_slope: f32,
    pub swim_height_scale: f32,
    pub region_min_size: i32,
}

impl Default for RecastSettings {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            cell_height: DEFAULT_CELL_HEIGHT,
            tile_size: DEFAULT_TILE_SIZE,
            border_size: DEFAULT_BORDER_SIZE,
            recast_scale_factor: DEFAULT_RECAST_SCALE_FACTOR,
            max_climb: DEFAULT_MAX_CLIMB,
            max_slope: DEFAULT_MAX_SLOPE,
            swim_height_scale: DEFAULT_SWIM_HEIGHT_SCALE,
            region_min_size: DEFAULT_REGION_MIN_SIZE,
        }
    }
}

impl RecastSettings {
    /// Size of one navmesh cell in world units.
    pub fn real_cell_size(&self) -> f32 {
        self.cell_size / self.recast_scale_factor
    }

    /// Size of one tile edge in world units.
    pub fn real_tile_size(&self) -> f32 {
        self.tile_size as f32 * self.real_cell_size()
    }

    /// Width of the border around each tile in world units.
    pub fn real_border_size(&self) -> f32 {
        self.border_size as f32 * self.real_cell_size()
    }

    pub fn with_tile_size(mut self, tile_size: i32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_border_size(mut self, border_size: i32) -> Self {
        self.border_size = border_size;
        self
    }
}

// =============================================================================
// Detour Settings
// =============================================================================

/// Query layer limits.
#[derive(Clone, Debug, PartialEq)]
pub struct DetourSettings {
    /// Maximum number of nodes expanded by one path search.
    pub max_navmesh_query_nodes: usize,
    /// Maximum number of cells in a raw path before smoothing.
    pub max_polygon_path_size: usize,
    /// Maximum number of points in a smoothed path.
    pub max_smooth_path_size: usize,
    pub area_costs: AreaCosts,
}

impl Default for DetourSettings {
    fn default() -> Self {
        Self {
            max_navmesh_query_nodes: DEFAULT_MAX_NAVMESH_QUERY_NODES,
            max_polygon_path_size: DEFAULT_MAX_POLYGON_PATH_SIZE,
            max_smooth_path_size: DEFAULT_MAX_SMOOTH_PATH_SIZE,
            area_costs: AreaCosts::default(),
        }
    }
}

/// Travel cost multipliers per area type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaCosts {
    pub water: f32,
    pub door: f32,
    pub pathgrid: f32,
    pub ground: f32,
}

impl Default for AreaCosts {
    fn default() -> Self {
        Self {
            water: 1.0,
            door: 1.0,
            pathgrid: 1.0,
            ground: 1.0,
        }
    }
}

// =============================================================================
// Navigator Settings
// =============================================================================

/// Complete navigator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Whether navigation is enabled at all.
    pub enable: bool,
    pub recast: RecastSettings,
    pub detour: DetourSettings,
    /// Number of async updater worker threads.
    pub async_navmesh_updater_threads: usize,
    /// Memory budget in bytes for the built tiles cache.
    pub max_navmesh_tiles_cache_size: usize,
    /// Minimum interval between two rebuilds of the same tile.
    pub min_update_interval: Duration,
    /// Manhattan tile distance around the player that must be built
    /// before the required tiles barrier releases. Zero or less disables it.
    pub wait_until_min_distance_to_player: i32,
    /// Number of tiles kept around the player.
    pub max_tiles_number: i32,
    /// Whether the navmesh database is used at all.
    pub enable_navmesh_disk_cache: bool,
    /// Whether newly built tiles are written to the database.
    pub write_to_navmeshdb: bool,
    /// Database file size limit in bytes.
    pub max_navmeshdb_file_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable: true,
            recast: RecastSettings::default(),
            detour: DetourSettings::default(),
            async_navmesh_updater_threads: DEFAULT_UPDATER_THREADS,
            max_navmesh_tiles_cache_size: DEFAULT_MAX_NAVMESH_TILES_CACHE_SIZE,
            min_update_interval: DEFAULT_MIN_UPDATE_INTERVAL,
            wait_until_min_distance_to_player: DEFAULT_WAIT_UNTIL_MIN_DISTANCE_TO_PLAYER,
            max_tiles_number: DEFAULT_MAX_TILES_NUMBER,
            enable_navmesh_disk_cache: true,
            write_to_navmeshdb: true,
            max_navmeshdb_file_size: DEFAULT_MAX_NAVMESHDB_FILE_SIZE,
        }
    }
}

impl Settings {
    pub fn with_recast(mut self, recast: RecastSettings) -> Self {
        self.recast = recast;
        self
    }

    pub fn with_updater_threads(mut self, threads: usize) -> Self {
        self.async_navmesh_updater_threads = threads;
        self
    }

    pub fn with_max_navmesh_tiles_cache_size(mut self, bytes: usize) -> Self {
        self.max_navmesh_tiles_cache_size = bytes;
        self
    }

    pub fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    pub fn with_wait_until_min_distance_to_player(mut self, distance: i32) -> Self {
        self.wait_until_min_distance_to_player = distance;
        self
    }

    pub fn with_max_tiles_number(mut self, max_tiles: i32) -> Self {
        self.max_tiles_number = max_tiles;
        self
    }

    pub fn with_write_to_navmeshdb(mut self, enabled: bool) -> Self {
        self.write_to_navmeshdb = enabled;
        self
    }

    pub fn with_max_navmeshdb_file_size(mut self, bytes: u64) -> Self {
        self.max_navmeshdb_file_size = bytes;
        self
    }

    /// Checks the values that would make tile math or the worker pool
    /// meaningless.
    pub fn validate(&self) -> NavigatorResult<()> {
        let recast = &self.recast;
        if recast.tile_size <= 0 {
            return Err(NavigatorError::InvalidSettings(format!(
                "tile size must be positive, got {}",
                recast.tile_size
            )));
        }
        if !(recast.cell_size > 0.0) || !recast.cell_size.is_finite() {
            return Err(NavigatorError::InvalidSettings(format!(
                "cell size must be positive, got {}",
                recast.cell_size
            )));
        }
        if !(recast.recast_scale_factor > 0.0) || !recast.recast_scale_factor.is_finite() {
            return Err(NavigatorError::InvalidSettings(format!(
                "recast scale factor must be positive, got {}",
                recast.recast_scale_factor
            )));
        }
        if recast.border_size < 0 {
            return Err(NavigatorError::InvalidSettings(format!(
                "border size must not be negative, got {}",
                recast.border_size
            )));
        }
        if self.async_navmesh_updater_threads == 0 {
            return Err(NavigatorError::InvalidSettings(
                "at least one updater thread is required".to_string(),
            ));
        }
        if self.max_tiles_number <= 0 {
            return Err(NavigatorError::InvalidSettings(format!(
                "max tiles number must be positive, got {}",
                self.max_tiles_number
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_real_tile_size_uses_scale_factor() {
        let recast = RecastSettings::default();
        let expected = 64.0 * 0.2 / DEFAULT_RECAST_SCALE_FACTOR;
        assert!((recast.real_tile_size() - expected).abs() < 1e-3);
        assert!((recast.real_tile_size() - 725.33).abs() < 0.1);
    }

    #[test]
    fn test_zero_tile_size_is_rejected() {
        let settings =
            Settings::default().with_recast(RecastSettings::default().with_tile_size(0));
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("tile size"));
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let settings = Settings::default().with_updater_threads(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_nan_cell_size_is_rejected() {
        let settings =
            Settings::default().with_recast(RecastSettings::default().with_cell_size(f32::NAN));
        assert!(settings.validate().is_err());
    }
}
