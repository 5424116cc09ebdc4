//! Integration tests for the async navmesh updater.
//!
//! These tests run the updater against a real geometry manager to verify:
//! - Reuse of built tiles through the memory cache
//! - `update` jobs bypassing the memory cache
//! - Tiles persisted to and loaded back from the navmesh database
//! - Several workers sharing one grid of tiles
//! - Failing and panicking builds staying contained to their tile
//!
//! Run with: `cargo test --test updater_integration`

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{IVec2, Vec2, Vec3};
use parking_lot::Mutex;
use tempfile::TempDir;

use detournav::coord::make_tile_bounds;
use detournav::settings::{RecastSettings, DEFAULT_MAX_NAVMESHDB_FILE_SIZE};
use detournav::{
    AgentBounds, AreaType, AsyncNavMeshUpdater, BuildError, ChangeType, CollisionShape,
    CollisionShapeType, GridTileBuilder, HeightfieldShape, NavMeshCacheItem, NavMeshDb,
    NoopListener, ObjectTransform, PreparedNavMeshData, RecastMesh, Settings,
    SharedNavMeshCacheItem, TileBuilder, TileCachedRecastMeshManager, TilePosition,
    WaitConditionType,
};

const WORLDSPACE: &str = "sys::default";

const GRID_PLAYER_TILE: TilePosition = TilePosition { x: 2, y: 2 };

// ============================================================================
// Helper Functions
// ============================================================================

fn agent() -> AgentBounds {
    AgentBounds::new(CollisionShapeType::Aabb, Vec3::new(29.0, 29.0, 66.0))
}

/// Manager holding a single 512 unit plane cell at the origin.
fn manager(settings: &Settings) -> Arc<TileCachedRecastMeshManager> {
    let manager = TileCachedRecastMeshManager::new(settings.recast.clone());
    manager.set_worldspace(WORLDSPACE);
    assert!(manager.add_heightfield(
        IVec2::ZERO,
        512,
        HeightfieldShape::Plane { height: 0.0 },
        |_, _| {}
    ));
    Arc::new(manager)
}

fn updater(
    settings: &Settings,
    manager: &Arc<TileCachedRecastMeshManager>,
    db: Option<NavMeshDb>,
) -> AsyncNavMeshUpdater {
    AsyncNavMeshUpdater::new(
        settings.clone(),
        Arc::clone(manager),
        Arc::new(GridTileBuilder::new()),
        db,
    )
    .expect("updater")
}

fn changed_tiles(change_type: ChangeType) -> BTreeMap<TilePosition, ChangeType> {
    BTreeMap::from([(TilePosition::new(0, 0), change_type)])
}

/// Posts one change of the origin tile and waits for all jobs.
fn post_and_wait(
    updater: &AsyncNavMeshUpdater,
    navmesh: &SharedNavMeshCacheItem,
    change_type: ChangeType,
) {
    updater.post(
        &agent(),
        navmesh,
        TilePosition::new(0, 0),
        WORLDSPACE,
        &changed_tiles(change_type),
    );
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
}

fn open_db(path: &Path) -> NavMeshDb {
    NavMeshDb::open(path, DEFAULT_MAX_NAVMESHDB_FILE_SIZE).expect("open db")
}

fn other_agent() -> AgentBounds {
    AgentBounds::new(CollisionShapeType::Cylinder, Vec3::new(20.0, 20.0, 50.0))
}

/// Tiles `(0, 0)` to `(4, 4)`.
fn grid() -> impl Iterator<Item = TilePosition> {
    (0..5).flat_map(|x| (0..5).map(move |y| TilePosition::new(x, y)))
}

fn grid_tiles(change_type: ChangeType) -> BTreeMap<TilePosition, ChangeType> {
    grid().map(|tile| (tile, change_type)).collect()
}

/// Manager holding a small box in the middle of every grid tile, so each
/// box touches exactly one tile.
fn grid_manager(settings: &Settings) -> Arc<TileCachedRecastMeshManager> {
    let manager = TileCachedRecastMeshManager::new(settings.recast.clone());
    manager.set_worldspace(WORLDSPACE);
    let shape = Arc::new(CollisionShape::new_box(Vec3::splat(10.0)));
    for tile in grid() {
        let bounds = make_tile_bounds(&settings.recast, tile);
        let center = ((bounds.min + bounds.max) / 2.0).extend(0.0);
        let id = manager.create_object_id();
        assert!(manager.add_object(
            id,
            Arc::clone(&shape),
            ObjectTransform::from_position(center),
            AreaType::Ground,
            |_, _| {}
        ));
    }
    Arc::new(manager)
}

/// Builder handing out a small flat tile for any geometry.
///
/// Counts builds per agent and tile, notices two workers building the same
/// pair at once, and fails or panics on the tiles it is told to.
#[derive(Default)]
struct ScriptedTileBuilder {
    failing: BTreeSet<TilePosition>,
    panicking: BTreeSet<TilePosition>,
    builds: Mutex<BTreeMap<(AgentBounds, TilePosition), usize>>,
    in_flight: Mutex<BTreeSet<(AgentBounds, TilePosition)>>,
    overlapped: AtomicBool,
}

impl ScriptedTileBuilder {
    fn breaking(failing: TilePosition, panicking: TilePosition) -> Self {
        Self {
            failing: BTreeSet::from([failing]),
            panicking: BTreeSet::from([panicking]),
            ..Self::default()
        }
    }

    fn builds(&self, agent: &AgentBounds, tile: TilePosition) -> usize {
        self.builds.lock().get(&(*agent, tile)).copied().unwrap_or(0)
    }

    fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

impl TileBuilder for ScriptedTileBuilder {
    fn build(
        &self,
        _recast_mesh: &RecastMesh,
        _worldspace: &str,
        tile: TilePosition,
        agent: &AgentBounds,
        _settings: &RecastSettings,
    ) -> Result<Option<PreparedNavMeshData>, BuildError> {
        let key = (*agent, tile);
        if !self.in_flight.lock().insert(key) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(2));
        self.in_flight.lock().remove(&key);
        *self.builds.lock().entry(key).or_default() += 1;

        if self.panicking.contains(&tile) {
            panic!("tile {tile} cannot be built");
        }
        if self.failing.contains(&tile) {
            return Err(BuildError::Failed(format!("tile {tile} refused")));
        }
        Ok(Some(PreparedNavMeshData {
            user_id: 0,
            tile,
            cell_size: 1.0,
            size: 2,
            origin: Vec2::new(tile.x as f32, tile.y as f32),
            heights: vec![0.0; 4],
            areas: vec![AreaType::Ground; 4],
        }))
    }
}

fn scripted_updater(
    settings: &Settings,
    manager: &Arc<TileCachedRecastMeshManager>,
    builder: &Arc<ScriptedTileBuilder>,
    db: Option<NavMeshDb>,
) -> AsyncNavMeshUpdater {
    AsyncNavMeshUpdater::new(settings.clone(), Arc::clone(manager), builder.clone(), db)
        .expect("updater")
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_repeated_add_hits_memory_cache() {
    let settings = Settings::default();
    let manager = manager(&settings);
    let updater = updater(&settings, &manager, None);
    let navmesh = NavMeshCacheItem::shared(1);

    post_and_wait(&updater, &navmesh, ChangeType::Add);
    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));
    assert_eq!(updater.stats().cache.hit_count, 0);

    post_and_wait(&updater, &navmesh, ChangeType::Add);
    let stats = updater.stats();
    assert_eq!(stats.cache.get_count, 2);
    assert_eq!(stats.cache.hit_count, 1);
    assert_eq!(stats.cache.used_navmesh_tiles, 1);
    assert_eq!(stats.jobs, 0);
}

#[test]
fn test_update_job_bypasses_memory_cache() {
    let settings = Settings::default();
    let manager = manager(&settings);
    let updater = updater(&settings, &manager, None);
    let navmesh = NavMeshCacheItem::shared(1);

    post_and_wait(&updater, &navmesh, ChangeType::Update);

    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));
    let stats = updater.stats();
    assert_eq!(stats.cache.cached_navmesh_tiles, 0);
    assert_eq!(stats.cache.used_navmesh_tiles, 0);
}

#[test]
fn test_built_tile_is_written_to_db() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("navmesh.db");
    let settings = Settings::default();
    let manager = manager(&settings);
    let navmesh = NavMeshCacheItem::shared(1);

    {
        let updater = updater(&settings, &manager, Some(open_db(&path)));
        post_and_wait(&updater, &navmesh, ChangeType::Add);

        let stats = updater.stats();
        let db = stats.db.expect("db stats");
        assert_eq!(db.get_tile_count, 1);
        assert_eq!(db.jobs.reading_jobs, 0);
        assert_eq!(db.jobs.writing_jobs, 0);
        assert_eq!(stats.db_get_tile_hits, 0);
    }

    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));
    assert_eq!(open_db(&path).get_tiles_count().expect("count"), 1);
}

#[test]
fn test_stored_tile_is_loaded_instead_of_rebuilt() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("navmesh.db");
    let settings = Settings::default();
    let manager = manager(&settings);

    {
        let updater = updater(&settings, &manager, Some(open_db(&path)));
        post_and_wait(&updater, &NavMeshCacheItem::shared(1), ChangeType::Add);
    }

    let settings = settings.with_max_navmesh_tiles_cache_size(0);
    let updater = updater(&settings, &manager, Some(open_db(&path)));
    let navmesh = NavMeshCacheItem::shared(2);
    post_and_wait(&updater, &navmesh, ChangeType::Add);

    let stats = updater.stats();
    assert_eq!(stats.db_get_tile_hits, 1);
    assert_eq!(stats.cache.navmesh_cache_size, 0);

    let item = navmesh.read();
    let tile = item.get_tile(TilePosition::new(0, 0)).expect("tile");
    assert_ne!(tile.user_id, 0);
    drop(item);
    assert_eq!(open_db(&path).get_tiles_count().expect("count"), 1);
}

#[test]
fn test_write_disabled_keeps_db_empty() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("navmesh.db");
    let settings = Settings::default().with_write_to_navmeshdb(false);
    let manager = manager(&settings);
    let navmesh = NavMeshCacheItem::shared(1);

    {
        let updater = updater(&settings, &manager, Some(open_db(&path)));
        post_and_wait(&updater, &navmesh, ChangeType::Add);
    }

    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));
    assert_eq!(open_db(&path).get_tiles_count().expect("count"), 0);
}

#[test]
fn test_tile_outside_player_range_is_removed() {
    let settings = Settings::default().with_max_tiles_number(4);
    let manager = manager(&settings);
    let updater = updater(&settings, &manager, None);
    let navmesh = NavMeshCacheItem::shared(1);

    post_and_wait(&updater, &navmesh, ChangeType::Add);
    assert!(navmesh.read().has_tile(TilePosition::new(0, 0)));

    updater.post(
        &agent(),
        &navmesh,
        TilePosition::new(10, 10),
        WORLDSPACE,
        &changed_tiles(ChangeType::Update),
    );
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
    assert!(!navmesh.read().has_tile(TilePosition::new(0, 0)));
}

#[test]
fn test_concurrent_workers_build_every_tile_once() {
    let settings = Settings::default()
        .with_updater_threads(4)
        .with_min_update_interval(Duration::from_millis(20));
    let manager = grid_manager(&settings);
    let builder = Arc::new(ScriptedTileBuilder::default());
    let updater = scripted_updater(&settings, &manager, &builder, None);
    let agents = [agent(), other_agent()];
    let navmeshes: Vec<_> = agents.iter().map(|_| NavMeshCacheItem::shared(1)).collect();
    let tiles = grid_tiles(ChangeType::Add);
    assert_eq!(tiles.len(), 25);

    for _ in 0..3 {
        for (agent, navmesh) in agents.iter().zip(&navmeshes) {
            updater.post(agent, navmesh, GRID_PLAYER_TILE, WORLDSPACE, &tiles);
        }
    }
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    for (agent, navmesh) in agents.iter().zip(&navmeshes) {
        let item = navmesh.read();
        assert_eq!(item.tiles().len(), 25);
        for tile in tiles.keys() {
            assert!(item.has_tile(*tile), "{agent} {tile}");
            assert_eq!(builder.builds(agent, *tile), 1, "{agent} {tile}");
        }
    }
    let stats = updater.stats();
    assert_eq!(stats.jobs, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.pushed, 0);

    // Updates bypass the memory cache and race for the same tiles.
    let updates = grid_tiles(ChangeType::Update);
    for _ in 0..2 {
        for (agent, navmesh) in agents.iter().zip(&navmeshes) {
            updater.post(agent, navmesh, GRID_PLAYER_TILE, WORLDSPACE, &updates);
        }
    }
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    assert!(!builder.overlapped(), "a tile was built by two workers at once");
    for (agent, navmesh) in agents.iter().zip(&navmeshes) {
        assert_eq!(navmesh.read().tiles().len(), 25);
        for tile in updates.keys() {
            let builds = builder.builds(agent, *tile);
            assert!((2..=3).contains(&builds), "{agent} {tile} built {builds} times");
        }
    }
    assert_eq!(updater.stats().jobs, 0);
}

#[test]
fn test_failed_and_panicking_builds_stay_contained() {
    let settings = Settings::default().with_updater_threads(2);
    let manager = grid_manager(&settings);
    let failing = TilePosition::new(1, 1);
    let panicking = TilePosition::new(3, 3);
    let builder = Arc::new(ScriptedTileBuilder::breaking(failing, panicking));
    let updater = scripted_updater(&settings, &manager, &builder, None);
    let navmesh = NavMeshCacheItem::shared(1);

    updater.post(&agent(), &navmesh, GRID_PLAYER_TILE, WORLDSPACE, &grid_tiles(ChangeType::Add));
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    {
        let item = navmesh.read();
        assert!(!item.has_tile(failing));
        assert!(!item.has_tile(panicking));
        assert_eq!(item.tiles().len(), 23);
        for broken in [failing, panicking] {
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let neighbour = TilePosition::new(broken.x + dx, broken.y + dy);
                assert!(item.has_tile(neighbour), "{neighbour}");
            }
        }
    }
    let stats = updater.stats();
    assert_eq!(stats.jobs, 0);
    assert_eq!(stats.processing, 0);

    // Both workers survived and keep taking jobs.
    let retry = BTreeMap::from([
        (failing, ChangeType::Add),
        (panicking, ChangeType::Add),
        (TilePosition::new(0, 0), ChangeType::Update),
    ]);
    updater.post(&agent(), &navmesh, GRID_PLAYER_TILE, WORLDSPACE, &retry);
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);

    assert_eq!(builder.builds(&agent(), failing), 2);
    assert_eq!(builder.builds(&agent(), panicking), 2);
    assert_eq!(builder.builds(&agent(), TilePosition::new(0, 0)), 2);
    assert_eq!(navmesh.read().tiles().len(), 23);
    assert_eq!(updater.stats().jobs, 0);
}

#[test]
fn test_stop_forgets_queued_jobs() {
    let temp = TempDir::new().expect("temp dir");
    let settings = Settings::default().with_updater_threads(2);
    let manager = grid_manager(&settings);
    let builder = Arc::new(ScriptedTileBuilder::default());
    let mut updater = scripted_updater(
        &settings,
        &manager,
        &builder,
        Some(open_db(&temp.path().join("navmesh.db"))),
    );
    let navmeshes = [NavMeshCacheItem::shared(1), NavMeshCacheItem::shared(2)];

    for (agent, navmesh) in [agent(), other_agent()].iter().zip(&navmeshes) {
        updater.post(agent, navmesh, GRID_PLAYER_TILE, WORLDSPACE, &grid_tiles(ChangeType::Add));
    }
    updater.stop();

    let stats = updater.stats();
    assert_eq!(stats.jobs, 0);
    assert_eq!(stats.processing, 0);
    let db = stats.db.expect("db stats");
    assert_eq!(db.jobs.reading_jobs, 0);
    assert_eq!(db.jobs.writing_jobs, 0);

    // Returns at once instead of waiting for jobs that no longer exist.
    updater.wait(&mut NoopListener, WaitConditionType::AllJobsDone);
}
