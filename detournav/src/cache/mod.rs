//! Memory cache of built tiles.
//!
//! Entries are keyed by agent, tile position and the content of the
//! [`RecastMesh`] they were built from, so a tile whose geometry returns to
//! an earlier state is served without rebuilding.
//!
//! Entries handed out through [`CachedNavMeshData`] are pinned: they count
//! against the budget but are never evicted. When the last handle of an
//! entry drops it becomes free and joins the eviction order, oldest first.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::agent::AgentBounds;
use crate::build::PreparedNavMeshData;
use crate::coord::TilePosition;
use crate::recast::RecastMesh;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    agent: AgentBounds,
    tile: TilePosition,
    fingerprint: [u8; 32],
}

struct Entry {
    mesh: RecastMesh,
    data: Arc<PreparedNavMeshData>,
    size: usize,
    used_count: usize,
    /// Position in the eviction order while free.
    free_stamp: Option<u64>,
}

struct CacheState {
    max_size: usize,
    used_size: usize,
    free_size: usize,
    entries: HashMap<CacheKey, Entry>,
    free_items: BTreeMap<u64, CacheKey>,
    next_stamp: u64,
    get_count: u64,
    hit_count: u64,
}

impl CacheState {
    fn acquire(&mut self, key: &CacheKey) -> Option<Arc<PreparedNavMeshData>> {
        let entry = self.entries.get_mut(key)?;
        if let Some(stamp) = entry.free_stamp.take() {
            self.free_items.remove(&stamp);
            self.free_size -= entry.size;
        }
        entry.used_count += 1;
        Some(Arc::clone(&entry.data))
    }

    fn release(&mut self, key: &CacheKey) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.used_count = entry.used_count.saturating_sub(1);
        if entry.used_count == 0 && entry.free_stamp.is_none() {
            let stamp = self.next_stamp;
            self.next_stamp += 1;
            entry.free_stamp = Some(stamp);
            self.free_items.insert(stamp, *key);
            self.free_size += entry.size;
        }
    }

    fn remove_least_recently_used(&mut self) -> bool {
        let Some((_, key)) = self.free_items.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.used_size -= entry.size;
            self.free_size -= entry.size;
            trace!(tile = %key.tile, size = entry.size, "Evicted cached navmesh tile");
        }
        true
    }
}

/// Size-bounded LRU cache of built tiles.
///
/// Cloning shares the same cache.
#[derive(Clone)]
pub struct NavMeshTilesCache {
    state: Arc<Mutex<CacheState>>,
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavMeshTilesCacheStats {
    /// Bytes held by all entries, pinned and free.
    pub navmesh_cache_size: usize,
    /// Entries with at least one live handle.
    pub used_navmesh_tiles: usize,
    pub cached_navmesh_tiles: usize,
    pub hit_count: u64,
    pub get_count: u64,
}

impl NavMeshTilesCache {
    /// Creates a cache holding at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                max_size,
                used_size: 0,
                free_size: 0,
                entries: HashMap::new(),
                free_items: BTreeMap::new(),
                next_stamp: 0,
                get_count: 0,
                hit_count: 0,
            })),
        }
    }

    /// Looks up the tile built for exactly this geometry and pins it.
    pub fn get(
        &self,
        agent: &AgentBounds,
        tile: TilePosition,
        recast_mesh: &RecastMesh,
    ) -> Option<CachedNavMeshData> {
        let key = CacheKey {
            agent: *agent,
            tile,
            fingerprint: *recast_mesh.fingerprint(),
        };
        let mut state = self.state.lock();
        state.get_count += 1;
        let matches = state
            .entries
            .get(&key)
            .is_some_and(|entry| entry.mesh.same_content(recast_mesh));
        if !matches {
            return None;
        }
        state.hit_count += 1;
        let data = state.acquire(&key)?;
        drop(state);
        Some(self.handle(key, data))
    }

    /// Inserts built data and pins it.
    ///
    /// When the same geometry is already cached the existing entry is
    /// returned and `data` discarded. Data that cannot fit, even after
    /// evicting every free entry, is handed back untouched and the cache is
    /// left unchanged.
    pub fn set(
        &self,
        agent: &AgentBounds,
        tile: TilePosition,
        recast_mesh: &RecastMesh,
        data: PreparedNavMeshData,
    ) -> Result<CachedNavMeshData, PreparedNavMeshData> {
        let key = CacheKey {
            agent: *agent,
            tile,
            fingerprint: *recast_mesh.fingerprint(),
        };
        let size = recast_mesh.content_size() + data.size();

        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get(&key) {
            if !entry.mesh.same_content(recast_mesh) {
                return Err(data);
            }
            return match state.acquire(&key) {
                Some(existing) => {
                    drop(state);
                    Ok(self.handle(key, existing))
                }
                None => Err(data),
            };
        }

        let available = state.free_size + state.max_size.saturating_sub(state.used_size);
        if size > available {
            return Err(data);
        }
        while state.used_size + size > state.max_size {
            if !state.remove_least_recently_used() {
                break;
            }
        }

        let data = Arc::new(data);
        state.entries.insert(
            key,
            Entry {
                mesh: recast_mesh.clone(),
                data: Arc::clone(&data),
                size,
                used_count: 1,
                free_stamp: None,
            },
        );
        state.used_size += size;
        drop(state);
        Ok(self.handle(key, data))
    }

    pub fn stats(&self) -> NavMeshTilesCacheStats {
        let state = self.state.lock();
        NavMeshTilesCacheStats {
            navmesh_cache_size: state.used_size,
            used_navmesh_tiles: state.entries.len() - state.free_items.len(),
            cached_navmesh_tiles: state.free_items.len(),
            hit_count: state.hit_count,
            get_count: state.get_count,
        }
    }

    fn handle(&self, key: CacheKey, data: Arc<PreparedNavMeshData>) -> CachedNavMeshData {
        CachedNavMeshData {
            state: Arc::clone(&self.state),
            key,
            data,
        }
    }
}

/// Pinned cache entry.
///
/// Each handle, clones included, keeps the entry from eviction until it is
/// dropped.
pub struct CachedNavMeshData {
    state: Arc<Mutex<CacheState>>,
    key: CacheKey,
    data: Arc<PreparedNavMeshData>,
}

impl CachedNavMeshData {
    pub fn get(&self) -> &PreparedNavMeshData {
        &self.data
    }

    pub fn shared(&self) -> Arc<PreparedNavMeshData> {
        Arc::clone(&self.data)
    }
}

impl Deref for CachedNavMeshData {
    type Target = PreparedNavMeshData;

    fn deref(&self) -> &PreparedNavMeshData {
        &self.data
    }
}

impl Clone for CachedNavMeshData {
    fn clone(&self) -> Self {
        let data = self.state.lock().acquire(&self.key);
        Self {
            state: Arc::clone(&self.state),
            key: self.key,
            data: data.unwrap_or_else(|| Arc::clone(&self.data)),
        }
    }
}

impl Drop for CachedNavMeshData {
    fn drop(&mut self) {
        self.state.lock().release(&self.key);
    }
}

impl fmt::Debug for CachedNavMeshData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedNavMeshData")
            .field("tile", &self.key.tile)
            .field("agent", &self.key.agent)
            .finish()
    }
}
