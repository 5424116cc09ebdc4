//! Navigator façade.
//!
//! [`Navigator`] is the public entry point. It owns the geometry manager
//! and the async updater, keeps one committed navmesh per agent and
//! answers path queries against whatever those navmeshes hold right now.
//!
//! # Lifecycle
//!
//! 1. Agents are registered with [`Navigator::add_agent`]
//! 2. Geometry is added, moved and removed through the `add_*`,
//!    `update_*` and `remove_*` methods
//! 3. [`Navigator::update`] posts the changed tiles around the player to
//!    the updater
//! 4. [`Navigator::wait`] blocks until the required tiles are built
//! 5. Queries run against the committed tiles
//!
//! # Example
//!
//! ```ignore
//! use detournav::{Navigator, Settings, WaitConditionType, NoopListener};
//!
//! let navigator = Navigator::new(Settings::default(), None)?;
//! navigator.add_agent(&agent);
//! navigator.add_heightfield(IVec2::ZERO, 8192, shape);
//! navigator.update(player_position);
//! navigator.wait(&mut NoopListener, WaitConditionType::RequiredTilesPresent);
//! let path = navigator.find_path(&agent, start, end, Flags::WALK);
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use glam::{IVec2, Vec3};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::agent::AgentBounds;
use crate::build::{GridTileBuilder, TileBuilder};
use crate::coord::{get_tile_position, make_range, should_add_tile, TilePosition};
use crate::db::NavMeshDb;
use crate::error::NavigatorResult;
use crate::geometry::{AreaType, CollisionShape, HeightfieldShape, ObjectTransform};
use crate::manager::{ChangeType, ObjectId, TileCachedRecastMeshManager};
use crate::navmesh::query::{search_area_half_extents, Flags, NavMeshQuery, PathResult, Status};
use crate::navmesh::{NavMeshCacheItem, SharedNavMeshCacheItem};
use crate::settings::Settings;
use crate::stats::NavigatorStats;
use crate::updater::{AsyncNavMeshUpdater, Listener, WaitConditionType};

struct AgentEntry {
    count: usize,
    navmesh: SharedNavMeshCacheItem,
}

#[derive(Default)]
struct NavigatorState {
    agents: BTreeMap<AgentBounds, AgentEntry>,
    player_tile: Option<TilePosition>,
    last_revision: Option<u64>,
    next_generation: u64,
}

impl NavigatorState {
    fn new_navmesh(&mut self) -> SharedNavMeshCacheItem {
        self.next_generation += 1;
        NavMeshCacheItem::shared(self.next_generation)
    }
}

/// Navigation mesh façade for a set of agents sharing one world.
pub struct Navigator {
    settings: Settings,
    manager: Arc<TileCachedRecastMeshManager>,
    updater: AsyncNavMeshUpdater,
    state: Mutex<NavigatorState>,
}

impl Navigator {
    /// Creates a navigator building tiles with [`GridTileBuilder`].
    pub fn new(settings: Settings, db: Option<NavMeshDb>) -> NavigatorResult<Self> {
        Self::with_builder(settings, Arc::new(GridTileBuilder::new()), db)
    }

    pub fn with_builder(
        settings: Settings,
        builder: Arc<dyn TileBuilder>,
        db: Option<NavMeshDb>,
    ) -> NavigatorResult<Self> {
        settings.validate()?;
        let manager = Arc::new(TileCachedRecastMeshManager::new(settings.recast.clone()));
        let updater =
            AsyncNavMeshUpdater::new(settings.clone(), Arc::clone(&manager), builder, db)?;
        Ok(Self {
            settings,
            manager,
            updater,
            state: Mutex::new(NavigatorState::default()),
        })
    }

    /// Creates a navigator with the database at `db_path`, if the disk
    /// cache is enabled.
    pub fn open(settings: Settings, db_path: Option<&Path>) -> NavigatorResult<Self> {
        let db = match db_path {
            Some(path) if settings.enable_navmesh_disk_cache => {
                let db = NavMeshDb::open(path, settings.max_navmeshdb_file_size)?;
                info!(path = %path.display(), "Opened navmesh database");
                Some(db)
            }
            _ => None,
        };
        Self::new(settings, db)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // =========================================================================
    // Agents
    // =========================================================================

    /// Registers an agent. Agents with equal bounds share one navmesh.
    ///
    /// Returns `false` for invalid bounds.
    pub fn add_agent(&self, agent: &AgentBounds) -> bool {
        if !agent.is_valid() {
            warn!(agent = %agent, "Ignoring invalid agent bounds");
            return false;
        }
        let mut state = self.state.lock();
        if let Some(entry) = state.agents.get_mut(agent) {
            entry.count += 1;
            return true;
        }
        let navmesh = state.new_navmesh();
        state.agents.insert(*agent, AgentEntry { count: 1, navmesh });
        state.player_tile = None;
        info!(agent = %agent, "Added navigator agent");
        true
    }

    /// Releases one registration of an agent. The navmesh is dropped with
    /// the last one; jobs still building it discard their result.
    pub fn remove_agent(&self, agent: &AgentBounds) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.agents.get_mut(agent) else {
            return false;
        };
        entry.count -= 1;
        if entry.count == 0 {
            state.agents.remove(agent);
            info!(agent = %agent, "Removed navigator agent");
        }
        true
    }

    /// Switches worldspace, dropping geometry, committed tiles and pending
    /// jobs.
    pub fn set_worldspace(&self, worldspace: &str) {
        if !self.manager.set_worldspace(worldspace) {
            return;
        }
        self.updater.discard_pending_jobs();
        let mut state = self.state.lock();
        let agents: Vec<AgentBounds> = state.agents.keys().copied().collect();
        for agent in agents {
            let navmesh = state.new_navmesh();
            if let Some(entry) = state.agents.get_mut(&agent) {
                entry.navmesh = navmesh;
            }
        }
        state.player_tile = None;
        state.last_revision = None;
        info!(worldspace, "Navigator worldspace changed");
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn create_object_id(&self) -> ObjectId {
        self.manager.create_object_id()
    }

    /// Adds an object. Invalid shapes and transforms are rejected.
    pub fn add_object(
        &self,
        id: ObjectId,
        shape: Arc<CollisionShape>,
        transform: ObjectTransform,
        area_type: AreaType,
    ) -> bool {
        if !shape.is_valid() || !transform.is_valid() {
            warn!(%id, "Ignoring invalid object");
            return false;
        }
        self.manager
            .add_object(id, shape, transform, area_type, |_, _| {})
    }

    /// Moves an object or changes its area type. Returns whether built
    /// tiles are affected.
    pub fn update_object(&self, id: ObjectId, transform: ObjectTransform, area_type: AreaType) -> bool {
        if !transform.is_valid() {
            warn!(%id, "Ignoring invalid object transform");
            return false;
        }
        self.manager
            .update_object(id, transform, area_type, |_, _| {})
    }

    pub fn remove_object(&self, id: ObjectId) -> bool {
        self.manager.remove_object(id, |_, _| {})
    }

    pub fn add_water(&self, cell_position: IVec2, cell_size: i32, level: f32) -> bool {
        if cell_size <= 0 || !level.is_finite() {
            return false;
        }
        self.manager
            .add_water(cell_position, cell_size, level, |_, _| {})
    }

    pub fn remove_water(&self, cell_position: IVec2) -> bool {
        self.manager.remove_water(cell_position, |_, _| {})
    }

    pub fn add_heightfield(&self, cell_position: IVec2, cell_size: i32, shape: HeightfieldShape) -> bool {
        if cell_size <= 0 {
            return false;
        }
        self.manager
            .add_heightfield(cell_position, cell_size, shape, |_, _| {})
    }

    pub fn remove_heightfield(&self, cell_position: IVec2) -> bool {
        self.manager.remove_heightfield(cell_position, |_, _| {})
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Posts every tile that needs work around the player to the updater.
    ///
    /// Does nothing unless geometry or the player tile changed since the
    /// last call.
    pub fn update(&self, player_position: Vec3) {
        let player_tile = get_tile_position(&self.settings.recast, player_position);
        let mut state = self.state.lock();
        if state.player_tile == Some(player_tile)
            && state.last_revision == Some(self.manager.get_revision())
        {
            return;
        }

        self.manager
            .set_range(make_range(player_tile, self.settings.max_tiles_number), |_, _| {});
        state.player_tile = Some(player_tile);
        state.last_revision = Some(self.manager.get_revision());
        let changed_tiles = self.manager.take_changed_tiles();
        let worldspace = self.manager.worldspace();

        for (agent, entry) in &state.agents {
            let tiles = self.tiles_to_post(&entry.navmesh, player_tile, &changed_tiles);
            debug!(agent = %agent, tile = %player_tile, tiles = tiles.len(), "Updating navmesh");
            self.updater
                .post(agent, &entry.navmesh, player_tile, &worldspace, &tiles);
        }
    }

    /// Like [`Navigator::update`], but only when the player entered
    /// another tile.
    pub fn update_player_position(&self, player_position: Vec3) {
        let player_tile = get_tile_position(&self.settings.recast, player_position);
        if self.state.lock().player_tile == Some(player_tile) {
            return;
        }
        self.update(player_position);
    }

    fn tiles_to_post(
        &self,
        navmesh: &SharedNavMeshCacheItem,
        player_tile: TilePosition,
        changed_tiles: &BTreeMap<TilePosition, ChangeType>,
    ) -> BTreeMap<TilePosition, ChangeType> {
        let max_tiles = self.settings.max_tiles_number;
        let mut tiles = changed_tiles.clone();
        let item = navmesh.read();
        self.manager.for_each_tile_position(|tile| {
            if tiles.contains_key(&tile) {
                return;
            }
            let should_add = should_add_tile(tile, player_tile, max_tiles);
            let present = item.has_tile(tile);
            if should_add && !present {
                let change_type = if item.is_empty_tile(tile) {
                    ChangeType::Update
                } else {
                    ChangeType::Add
                };
                tiles.insert(tile, change_type);
            } else if !should_add && present {
                tiles.insert(tile, ChangeType::Remove);
            }
        });
        tiles
    }

    /// Blocks until `condition` holds.
    pub fn wait(&self, listener: &mut dyn Listener, condition: WaitConditionType) {
        self.updater.wait(listener, condition);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_navmesh(&self, agent: &AgentBounds) -> Option<SharedNavMeshCacheItem> {
        self.state
            .lock()
            .agents
            .get(agent)
            .map(|entry| Arc::clone(&entry.navmesh))
    }

    pub fn get_navmeshes(&self) -> BTreeMap<AgentBounds, SharedNavMeshCacheItem> {
        self.state
            .lock()
            .agents
            .iter()
            .map(|(agent, entry)| (*agent, Arc::clone(&entry.navmesh)))
            .collect()
    }

    pub fn find_path(&self, agent: &AgentBounds, start: Vec3, end: Vec3, flags: Flags) -> PathResult {
        let Some(navmesh) = self.get_navmesh(agent) else {
            return PathResult::failed(Status::NavMeshNotFound);
        };
        let item = navmesh.read();
        NavMeshQuery::new(&item, &self.settings).find_path(agent, &self.settings, start, end, flags)
    }

    /// Walks from `start` toward `end`; `None` when `start` is off the
    /// navmesh or the agent is unknown.
    pub fn raycast(&self, agent: &AgentBounds, start: Vec3, end: Vec3, flags: Flags) -> Option<Vec3> {
        let navmesh = self.get_navmesh(agent)?;
        let item = navmesh.read();
        NavMeshQuery::new(&item, &self.settings).raycast(agent, &self.settings, start, end, flags)
    }

    pub fn find_random_point_around_circle(
        &self,
        agent: &AgentBounds,
        start: Vec3,
        max_radius: f32,
        flags: Flags,
        rng: &mut impl Rng,
    ) -> Option<Vec3> {
        let navmesh = self.get_navmesh(agent)?;
        let item = navmesh.read();
        NavMeshQuery::new(&item, &self.settings).find_random_point_around_circle(
            agent,
            &self.settings,
            start,
            max_radius,
            flags,
            rng,
        )
    }

    pub fn find_nearest_navmesh_position(
        &self,
        agent: &AgentBounds,
        position: Vec3,
        flags: Flags,
    ) -> Option<Vec3> {
        let navmesh = self.get_navmesh(agent)?;
        let item = navmesh.read();
        let half_extents = search_area_half_extents(agent, &self.settings);
        NavMeshQuery::new(&item, &self.settings).find_nearest_position(position, half_extents, flags)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn stats(&self) -> NavigatorStats {
        NavigatorStats {
            agents: self.state.lock().agents.len(),
            updater: self.updater.stats(),
            recast: self.manager.stats(),
        }
    }

    /// Radius around the player, in world units, covered by the tile budget.
    pub fn get_max_navmesh_area_real_radius(&self) -> f32 {
        let radius_in_tiles =
            ((self.settings.max_tiles_number.max(0) as f32 / std::f32::consts::PI).sqrt() - 1.0).max(0.0);
        radius_in_tiles * self.settings.recast.real_tile_size()
    }
}
