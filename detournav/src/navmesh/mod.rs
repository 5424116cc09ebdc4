//! Committed per-agent navmesh.
//!
//! A [`NavMeshCacheItem`] holds the tiles built for one agent. Workers
//! commit into it under the write lock of a [`GuardedNavMeshCacheItem`]
//! while queries read it under the read lock; every commit bumps the
//! item's revision.

pub mod query;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::build::PreparedNavMeshData;
use crate::cache::CachedNavMeshData;
use crate::coord::TilePosition;
use crate::recast::Version;

/// Outcome of committing into a [`NavMeshCacheItem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateNavMeshStatus {
    /// Nothing changed.
    Ignored,
    Removed,
    Added,
    Replaced,
    /// The data was rejected, nothing was there before.
    Failed,
    /// The data was rejected after the old tile was dropped.
    Lost,
}

impl UpdateNavMeshStatus {
    pub fn is_success(self) -> bool {
        !matches!(self, UpdateNavMeshStatus::Failed | UpdateNavMeshStatus::Lost)
    }
}

impl fmt::Display for UpdateNavMeshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateNavMeshStatus::Ignored => "ignored",
            UpdateNavMeshStatus::Removed => "removed",
            UpdateNavMeshStatus::Added => "added",
            UpdateNavMeshStatus::Replaced => "replaced",
            UpdateNavMeshStatus::Failed => "failed",
            UpdateNavMeshStatus::Lost => "lost",
        };
        f.write_str(name)
    }
}

/// Committed tile.
#[derive(Debug)]
pub struct NavMeshTile {
    /// Geometry version the tile was built from.
    pub source_version: Version,
    pub data: Arc<PreparedNavMeshData>,
    /// Keeps the cache entry pinned while the tile is committed.
    _cached: Option<CachedNavMeshData>,
}

/// Tiles of one agent.
#[derive(Debug)]
pub struct NavMeshCacheItem {
    generation: u64,
    revision: u64,
    tiles: BTreeMap<TilePosition, NavMeshTile>,
    empty_tiles: BTreeSet<TilePosition>,
}

pub type GuardedNavMeshCacheItem = RwLock<NavMeshCacheItem>;
pub type SharedNavMeshCacheItem = Arc<GuardedNavMeshCacheItem>;

impl NavMeshCacheItem {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            revision: 0,
            tiles: BTreeMap::new(),
            empty_tiles: BTreeSet::new(),
        }
    }

    pub fn shared(generation: u64) -> SharedNavMeshCacheItem {
        Arc::new(RwLock::new(Self::new(generation)))
    }

    pub fn version(&self) -> Version {
        Version::new(self.generation, self.revision)
    }

    pub fn tiles(&self) -> &BTreeMap<TilePosition, NavMeshTile> {
        &self.tiles
    }

    pub fn get_tile(&self, tile: TilePosition) -> Option<&PreparedNavMeshData> {
        self.tiles.get(&tile).map(|t| t.data.as_ref())
    }

    pub fn has_tile(&self, tile: TilePosition) -> bool {
        self.tiles.contains_key(&tile)
    }

    /// Whether the tile was built and found to have no walkable area.
    pub fn is_empty_tile(&self, tile: TilePosition) -> bool {
        self.empty_tiles.contains(&tile)
    }

    /// Commits built data for a tile.
    ///
    /// Identical content and data built from an older geometry revision of
    /// the same generation than the committed tile are ignored.
    pub fn update_tile(
        &mut self,
        tile: TilePosition,
        cached: Option<CachedNavMeshData>,
        data: Arc<PreparedNavMeshData>,
        source_version: Version,
    ) -> UpdateNavMeshStatus {
        if let Some(existing) = self.tiles.get(&tile) {
            if existing.data.same_content(&data) {
                return UpdateNavMeshStatus::Ignored;
            }
            if existing.source_version.generation == source_version.generation
                && source_version < existing.source_version
            {
                return UpdateNavMeshStatus::Ignored;
            }
        }
        if data.tile != tile {
            return match self.tiles.remove(&tile) {
                Some(_) => {
                    self.revision += 1;
                    UpdateNavMeshStatus::Lost
                }
                None => UpdateNavMeshStatus::Failed,
            };
        }
        self.empty_tiles.remove(&tile);
        let replaced = self
            .tiles
            .insert(
                tile,
                NavMeshTile {
                    source_version,
                    data,
                    _cached: cached,
                },
            )
            .is_some();
        self.revision += 1;
        if replaced {
            UpdateNavMeshStatus::Replaced
        } else {
            UpdateNavMeshStatus::Added
        }
    }

    pub fn remove_tile(&mut self, tile: TilePosition) -> UpdateNavMeshStatus {
        self.empty_tiles.remove(&tile);
        if self.tiles.remove(&tile).is_none() {
            return UpdateNavMeshStatus::Ignored;
        }
        self.revision += 1;
        UpdateNavMeshStatus::Removed
    }

    /// Records that a tile has nothing walkable, dropping any committed data.
    pub fn mark_as_empty(&mut self, tile: TilePosition) -> UpdateNavMeshStatus {
        let status = self.remove_tile(tile);
        self.empty_tiles.insert(tile);
        status
    }

    pub fn empty_tiles_count(&self) -> usize {
        self.empty_tiles.len()
    }
}
